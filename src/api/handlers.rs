//! REST handlers for services and their rule sets.

use super::ApiState;
use super::response::{ApiResult, MessageResponse, WriteResponse};
use crate::{
    Error,
    catalog::ConditionOption,
    database::ServiceRecord,
    manager::{NewService, RuleKind},
    rules::{ConditionRule, ScriptRule},
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: crate::VERSION,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Prometheus text exposition; empty when no recorder is installed.
pub async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let body = state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

pub async fn list_services(State(state): State<ApiState>) -> ApiResult<Json<Vec<ServiceRecord>>> {
    Ok(Json(state.manager.list_services().await?))
}

pub async fn create_service(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<WriteResponse> {
    let new: NewService = serde_json::from_slice(&body).map_err(Error::from)?;
    let created = state.manager.create_service(new).await?;

    Ok(WriteResponse::created(
        format!(
            "Service '{}' created with {} default script rules",
            created.service.name, created.seeded
        ),
        created.seeded,
    ))
}

pub async fn get_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ServiceRecord>> {
    Ok(Json(state.manager.get_service(&name).await?))
}

pub async fn delete_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<MessageResponse> {
    state.manager.delete_service(&name).await?;
    Ok(MessageResponse::new(
        StatusCode::OK,
        format!("Service '{}' deleted", name),
    ))
}

pub async fn bootstrap_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<WriteResponse> {
    let seeded = state.manager.bootstrap_service(&name).await?;
    Ok(WriteResponse::created(
        format!("Seeded {} default script rules for '{}'", seeded, name),
        seeded,
    ))
}

async fn list_rules<R: RuleKind>(state: &ApiState, service: &str) -> ApiResult<Json<Vec<R>>> {
    Ok(Json(state.manager.list_rules::<R>(service).await?))
}

async fn replace_rules<R: RuleKind>(
    state: &ApiState,
    service: &str,
    body: &Bytes,
) -> ApiResult<WriteResponse> {
    debug!(service = %service, bytes = body.len(), "Rule replacement requested");
    let created = state.manager.replace_rules::<R>(service, body).await?;

    Ok(WriteResponse::created(
        format!("Replaced {} rules of '{}'", R::TABLE.label(), service),
        created,
    ))
}

pub async fn get_condition_rules(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> ApiResult<Json<Vec<ConditionRule>>> {
    list_rules(&state, &service).await
}

pub async fn put_condition_rules(
    State(state): State<ApiState>,
    Path(service): Path<String>,
    body: Bytes,
) -> ApiResult<WriteResponse> {
    replace_rules::<ConditionRule>(&state, &service, &body).await
}

pub async fn get_script_rules(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> ApiResult<Json<Vec<ScriptRule>>> {
    list_rules(&state, &service).await
}

pub async fn put_script_rules(
    State(state): State<ApiState>,
    Path(service): Path<String>,
    body: Bytes,
) -> ApiResult<WriteResponse> {
    replace_rules::<ScriptRule>(&state, &service, &body).await
}

pub async fn condition_options(
    State(state): State<ApiState>,
    Path(protocol): Path<String>,
) -> ApiResult<Json<Vec<ConditionOption>>> {
    Ok(Json(state.manager.condition_options(&protocol)?))
}
