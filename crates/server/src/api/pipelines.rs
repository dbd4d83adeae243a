//! Pipeline API handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use enricher_core::{
    content::ContentCounts, ratelimit::RateLimitStatus, BatchStatistics, ContentType,
    PipelineError, PipelineStatus, RunRequest,
};

use super::{api_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Status of one pipeline with the live statistics of its active run.
#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    #[serde(flatten)]
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<BatchStatistics>,
}

#[derive(Debug, Serialize)]
pub struct ListPipelinesResponse {
    pub pipelines: Vec<PipelineResponse>,
}

#[derive(Debug, Serialize)]
pub struct PipelineDetailResponse {
    #[serde(flatten)]
    pub pipeline: PipelineResponse,
    pub enabled: bool,
    pub counts: ContentCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitStatus>,
}

#[derive(Debug, Serialize)]
pub struct RunAcceptedResponse {
    pub content_type: ContentType,
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub content_type: ContentType,
    pub cancelled: bool,
}

fn parse_content_type(raw: &str) -> Result<ContentType, ApiError> {
    raw.parse::<ContentType>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

fn pipeline_response(state: &AppState, status: PipelineStatus) -> PipelineResponse {
    let progress = state.service().progress(status.content_type);
    PipelineResponse { status, progress }
}

// ============================================================================
// Handlers
// ============================================================================

/// List every pipeline
pub async fn list_pipelines(State(state): State<Arc<AppState>>) -> Json<ListPipelinesResponse> {
    let pipelines = state
        .service()
        .status()
        .into_iter()
        .map(|status| pipeline_response(&state, status))
        .collect();
    Json(ListPipelinesResponse { pipelines })
}

/// Get one pipeline with its store counters
pub async fn get_pipeline(
    State(state): State<Arc<AppState>>,
    Path(content_type): Path<String>,
) -> Result<Json<PipelineDetailResponse>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let service = state.service();

    let counts = service
        .counts(content_type)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let status = service.status_of(content_type);

    Ok(Json(PipelineDetailResponse {
        pipeline: pipeline_response(&state, status),
        enabled: service.settings().get(content_type).enabled,
        counts,
        rate_limit: service.limiter().status(content_type),
    }))
}

/// Start a run in the background.
///
/// The body is an optional `RunRequest`; an empty body selects every
/// pending item.
pub async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    Path(content_type): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<RunAcceptedResponse>), ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let request: RunRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            api_error(StatusCode::BAD_REQUEST, format!("Invalid run request: {}", e))
        })?
    };

    let run = state
        .service()
        .spawn_run(content_type, request)
        .map_err(|e| match e {
            PipelineError::AlreadyRunning(_) => api_error(StatusCode::CONFLICT, e),
            PipelineError::Disabled(_) => api_error(StatusCode::BAD_REQUEST, e),
            other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other),
        })?;

    info!(content_type = %content_type, "Pipeline run accepted");

    let handle = tokio::spawn(async move {
        match run.await {
            Ok(Ok(stats)) => info!(
                content_type = %content_type,
                processed = stats.processed_items,
                cancelled = stats.cancelled,
                "Background run finished"
            ),
            Ok(Err(e)) => warn!(content_type = %content_type, error = %e, "Background run failed"),
            Err(e) => error!(content_type = %content_type, error = %e, "Background run crashed"),
        }
    });
    state.track_run(content_type, handle);

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAcceptedResponse {
            content_type,
            accepted: true,
        }),
    ))
}

/// Cancel the active run, if any
pub async fn cancel_pipeline(
    State(state): State<Arc<AppState>>,
    Path(content_type): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let cancelled = state.service().cancel(content_type);
    Ok(Json(CancelResponse {
        content_type,
        cancelled,
    }))
}
