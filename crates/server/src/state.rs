use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::warn;

use enricher_core::{Config, ContentType, EnrichmentService, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    config_hash: String,
    service: Arc<EnrichmentService>,
    /// Background runs started over HTTP, one per content type.
    runs: Mutex<HashMap<ContentType, JoinHandle<()>>>,
}

impl AppState {
    pub fn new(config: Config, config_hash: String, service: Arc<EnrichmentService>) -> Self {
        Self {
            config,
            config_hash,
            service,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn service(&self) -> &Arc<EnrichmentService> {
        &self.service
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<ContentType, JoinHandle<()>>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remember a background run. A finished previous run is simply replaced.
    pub fn track_run(&self, content_type: ContentType, handle: JoinHandle<()>) {
        if let Some(previous) = self.runs().insert(content_type, handle) {
            if !previous.is_finished() {
                warn!(content_type = %content_type, "Replacing a run handle that is still active");
            }
        }
    }

    /// Wait for every background run to return.
    pub async fn drain_runs(&self) {
        let handles: Vec<_> = self.runs().drain().collect();
        for (content_type, handle) in handles {
            if let Err(e) = handle.await {
                warn!(content_type = %content_type, error = %e, "Background run ended abnormally");
            }
        }
    }
}
