//! Prometheus metrics for the HTTP server.
//!
//! Request metrics live here; enrichment metrics are declared in
//! `enricher_core::metrics` and registered into the same registry.
//! Pipeline gauges are refreshed from the service on every scrape.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tracing::warn;

use enricher_core::{ContentType, PipelineState};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "enricher_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enricher_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "enricher_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics (collected dynamically)
// =============================================================================

/// Pipeline running state (1 = running, 0 = not running).
pub static PIPELINE_RUNNING: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "enricher_pipeline_running",
            "Whether the pipeline of a content type is running (1) or not (0)",
        ),
        &["content_type"],
    )
    .unwrap()
});

/// Items of the active run not processed yet.
pub static RUN_ITEMS_REMAINING: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "enricher_run_items_remaining",
            "Items of the active run not processed yet",
        ),
        &["content_type"],
    )
    .unwrap()
});

/// Store items still waiting for a final result.
pub static ITEMS_PENDING: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "enricher_items_pending",
            "Stored items without a final enrichment result",
        ),
        &["content_type"],
    )
    .unwrap()
});

/// Requests the rate limiter would still admit in the current window.
pub static RATE_LIMIT_AVAILABLE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "enricher_rate_limit_available",
            "Requests still admitted in the current rate limit window",
        ),
        &["scope"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let local: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(PIPELINE_RUNNING.clone()),
        Box::new(RUN_ITEMS_REMAINING.clone()),
        Box::new(ITEMS_PENDING.clone()),
        Box::new(RATE_LIMIT_AVAILABLE.clone()),
    ];

    for metric in local.into_iter().chain(enricher_core::metrics::all_metrics()) {
        if let Err(e) = registry.register(metric) {
            warn!("Failed to register metric: {}", e);
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Refresh pipeline gauges from the service before a scrape.
pub fn collect_dynamic_metrics(state: &AppState) {
    let service = state.service();
    for status in service.status() {
        let label = status.content_type.as_str();
        let running = status.state == PipelineState::Running;
        PIPELINE_RUNNING
            .with_label_values(&[label])
            .set(i64::from(running));

        let remaining = service
            .progress(status.content_type)
            .map(|p| p.total_items.saturating_sub(p.processed_items))
            .unwrap_or(0);
        RUN_ITEMS_REMAINING
            .with_label_values(&[label])
            .set(remaining as i64);

        if let Ok(counts) = service.counts(status.content_type) {
            ITEMS_PENDING
                .with_label_values(&[label])
                .set(counts.pending as i64);
        }
    }

    let limiter = service.limiter();
    for (content_type, status) in limiter.all_status() {
        RATE_LIMIT_AVAILABLE
            .with_label_values(&[content_type.as_str()])
            .set(i64::from(status.available));
    }
    if let Some(status) = limiter.global_status() {
        RATE_LIMIT_AVAILABLE
            .with_label_values(&["global"])
            .set(i64::from(status.available));
    }
}

static UUID_RE: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});

static NUMERIC_RE: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels.
///
/// Ids become `{id}` and unknown pipeline names become `{unknown}`, so
/// label cardinality stays bounded.
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");

    let mut segments: Vec<&str> = result.split('/').collect();
    if let Some(pos) = segments.iter().position(|s| *s == "pipelines") {
        if let Some(name) = segments.get_mut(pos + 1) {
            if !name.is_empty() && name.parse::<ContentType>().is_err() {
                *name = "{unknown}";
            }
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/runs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/runs/{id}");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/items/12345"), "/api/v1/items/{id}");
        assert_eq!(
            normalize_path("/api/v1/items/12/results/3"),
            "/api/v1/items/{id}/results/{id}"
        );
    }

    #[test]
    fn test_normalize_path_pipelines() {
        assert_eq!(
            normalize_path("/api/v1/pipelines/article/run"),
            "/api/v1/pipelines/article/run"
        );
        assert_eq!(
            normalize_path("/api/v1/pipelines/videos/run"),
            "/api/v1/pipelines/{unknown}/run"
        );
        assert_eq!(normalize_path("/api/v1/pipelines"), "/api/v1/pipelines");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("enricher_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Vec metrics only show up once a label set exists.
        enricher_core::metrics::ITEMS_PROCESSED
            .with_label_values(&["article", "success"])
            .inc_by(0);
        PIPELINE_RUNNING.with_label_values(&["article"]).set(0);

        let output = encode_metrics().unwrap();
        assert!(output.contains("enricher_items_processed_total"));
        assert!(output.contains("enricher_pipeline_running"));
    }
}
