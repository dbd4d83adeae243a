use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use enricher_core::SanitizedConfig;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the provider cannot be reached.
    pub status: String,
    pub provider: ProviderHealth,
}

#[derive(Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub model: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness plus a provider reachability check. Always 200 while the
/// server runs; a failing provider only degrades the status.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let service = state.service();
    let check = service.provider_health().await;
    if let Err(ref e) = check {
        warn!(provider = service.provider(), error = %e, "Provider health check failed");
    }

    Json(HealthResponse {
        status: if check.is_ok() { "ok" } else { "degraded" }.to_string(),
        provider: ProviderHealth {
            name: service.provider().to_string(),
            model: service.model().to_string(),
            reachable: check.is_ok(),
            error: check.err().map(|e| e.to_string()),
        },
    })
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub config: SanitizedConfig,
    /// SHA-256 of the effective configuration.
    pub hash: String,
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        config: state.sanitized_config(),
        hash: state.config_hash().to_string(),
    })
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            e.to_string(),
        ),
    }
}
