use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub validator: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage_ok = state.storage.health_check().await;
    let validator_ok = state.validator.health_check().await;

    // Validation outages degrade to rejections, so only storage decides overall status.
    let status = if storage_ok { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        storage: if storage_ok { "available" } else { "unavailable" }.to_string(),
        validator: if validator_ok { "reachable" } else { "unreachable" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
