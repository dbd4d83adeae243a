use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{enrich, handlers, middleware::metrics_middleware, pipelines};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Pipelines
        .route("/pipelines", get(pipelines::list_pipelines))
        .route("/pipelines/{content_type}", get(pipelines::get_pipeline))
        .route("/pipelines/{content_type}/run", post(pipelines::run_pipeline))
        .route("/pipelines/{content_type}/cancel", post(pipelines::cancel_pipeline))
        // Ad-hoc enrichment
        .route("/enrich", post(enrich::enrich));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
