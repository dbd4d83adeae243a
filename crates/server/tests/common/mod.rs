//! Common test utilities for API testing with mocks.
//!
//! The fixture builds the real router over an in-process service with a
//! SQLite store in a temp dir and a mocked provider, so requests go
//! through every layer without network access.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use enricher_core::{
    testing::MockLlmClient, Config, ContentStore, ContentType, EnrichmentService, NewContentItem,
    PipelineState, RateLimiterConfig, SqliteContentStore,
};
use enricher_server::{api::create_router, state::AppState};

/// Test fixture with a controllable provider and a seeded store.
pub struct TestFixture {
    pub router: Router,
    pub client: Arc<MockLlmClient>,
    pub store: Arc<SqliteContentStore>,
    pub service: Arc<EnrichmentService>,
    pub state: Arc<AppState>,
    /// Keeps the database alive
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(mut config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        config.database.path = temp_dir.path().join("test.db");

        let store = Arc::new(
            SqliteContentStore::new(&config.database.path).expect("Failed to create store"),
        );
        let client = Arc::new(MockLlmClient::new());
        let service = Arc::new(EnrichmentService::from_config(
            &config,
            Arc::clone(&client) as _,
            Arc::clone(&store) as Arc<dyn ContentStore>,
        ));
        let state = Arc::new(AppState::new(
            config,
            "0123456789abcdef".to_string(),
            Arc::clone(&service),
        ));
        let router = create_router(Arc::clone(&state));

        Self {
            router,
            client,
            store,
            service,
            state,
            temp_dir,
        }
    }

    /// Insert `count` items of a content type.
    pub fn seed(&self, content_type: ContentType, count: usize) {
        for i in 0..count {
            self.store
                .insert(NewContentItem::new(
                    content_type,
                    format!("Report {} on the regional elections and turnout figures.", i),
                ))
                .expect("Failed to insert item");
        }
    }

    /// Poll until the pipeline is no longer running.
    pub async fn wait_idle(&self, content_type: ContentType) {
        for _ in 0..200 {
            if self.service.status_of(content_type).state != PipelineState::Running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pipeline {} did not finish in time", content_type);
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// POST without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// POST a raw string body (for malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// GET returning the raw body text (for /metrics).
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Fast settings: small batches, no pacing, no rate limiting in practice.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.rate_limit = RateLimiterConfig::uniform(100_000);
    for content_type in ContentType::ALL {
        let settings = config.content.get_mut(content_type);
        settings.min_content_length = 10;
        settings.batch = settings
            .batch
            .clone()
            .with_batch_size(5)
            .with_inter_batch_delay_ms(5);
    }
    config.content.comment.enabled = false;
    config
}
