//! Ad-hoc enrichment of a single text.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;

use enricher_core::{ContentItem, ContentType, ItemEnrichmentResult};

use super::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrichBody {
    pub content_type: String,
    pub text: String,
    pub language_hint: Option<String>,
}

/// Enrich a text with its content type's settings. Nothing is persisted.
pub async fn enrich(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnrichBody>,
) -> Result<Json<ItemEnrichmentResult>, ApiError> {
    let content_type = body
        .content_type
        .parse::<ContentType>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let mut item = ContentItem::new(0, content_type, body.text);
    if let Some(language) = body.language_hint.filter(|l| !l.trim().is_empty()) {
        item = item.with_language_hint(language);
    }

    Ok(Json(state.service().enrich_one(&item).await))
}
