pub mod handlers;
pub mod response;

use crate::manager::RuleManager;
use axum::{
    Router,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use handlers::{
    bootstrap_service, condition_options, create_service, delete_service, get_condition_rules,
    get_script_rules, get_service, health_handler, list_services, metrics_handler,
    put_condition_rules, put_script_rules,
};

/// Shared state of every request handler.
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<RuleManager>,
    pub prometheus: Option<PrometheusHandle>,
}

impl ApiState {
    pub fn new(manager: Arc<RuleManager>, prometheus: Option<PrometheusHandle>) -> Self {
        Self {
            manager,
            prometheus,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Services
        .route("/services", get(list_services).post(create_service))
        .route("/services/:name", get(get_service).delete(delete_service))
        .route("/services/:name/bootstrap", post(bootstrap_service))
        // Rules
        .route(
            "/rules/conditions/options/:protocol",
            get(condition_options),
        )
        .route(
            "/rules/conditions/:service",
            get(get_condition_rules).put(put_condition_rules),
        )
        .route(
            "/rules/scripts/:service",
            get(get_script_rules).put(put_script_rules),
        )
        .with_state(state)
}
