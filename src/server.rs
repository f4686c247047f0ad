use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::Result;
use crate::api::{self, ApiState};
use crate::manager::error::ManagerError;

pub struct ApiServer {
    listener: TcpListener,
    state: ApiState,
}

impl ApiServer {
    pub async fn bind(bind_addr: &str, state: ApiState) -> Result<Self> {
        let listener =
            TcpListener::bind(bind_addr)
                .await
                .map_err(|e| ManagerError::ApiServerStartFailed {
                    address: bind_addr.to_string(),
                    reason: "Failed to bind listener".to_string(),
                    source: e,
                })?;

        info!("API server will bind to {}", listener.local_addr()?);

        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve requests until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting API server on {}", self.listener.local_addr()?);

        axum::serve(self.listener, api::router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

pub fn setup_metrics() -> Result<PrometheusHandle> {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .map_err(|e| crate::Error::metrics(format!("Failed to setup metrics: {}", e)))?;

    metrics::describe_counter!(
        "deemas_rules_replaced_total",
        "Total number of rule sets replaced"
    );
    metrics::describe_counter!(
        "deemas_replace_failures_total",
        "Total number of rejected or failed rule set replacements"
    );
    metrics::describe_counter!(
        "deemas_default_rules_seeded_total",
        "Total number of default script rules seeded"
    );
    metrics::describe_gauge!(
        "deemas_active_services",
        "Number of currently registered services"
    );
    metrics::describe_histogram!(
        "deemas_rule_replace_duration_seconds",
        "Time taken to replace a rule set"
    );

    Ok(handle)
}

// Metrics helper functions
pub fn increment_rules_replaced(kind: &'static str) {
    metrics::counter!("deemas_rules_replaced_total", "kind" => kind).increment(1);
}

pub fn increment_replace_failures(kind: &'static str) {
    metrics::counter!("deemas_replace_failures_total", "kind" => kind).increment(1);
}

pub fn increment_default_rules_seeded(count: u64) {
    metrics::counter!("deemas_default_rules_seeded_total").increment(count);
}

pub fn set_active_services(count: u64) {
    metrics::gauge!("deemas_active_services").set(count as f64);
}

pub fn record_rule_replace_duration(duration: std::time::Duration) {
    metrics::histogram!("deemas_rule_replace_duration_seconds").record(duration.as_secs_f64());
}
