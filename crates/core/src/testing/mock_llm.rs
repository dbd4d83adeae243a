//! Mock LLM client for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::analysis::AnalysisTaskKind;
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage};

/// What the mock does for one call.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text as the completion.
    Text(String),
    /// Fail the call.
    Error(LlmError),
    /// Panic inside the call, as a buggy provider client would.
    Panic(String),
}

/// A recorded completion call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Task kind inferred from the prompt, if recognizable.
    pub kind: Option<AnalysisTaskKind>,
    pub request: CompletionRequest,
    pub timestamp: Instant,
}

/// Produces a reply from the inferred task kind and the request.
type ReplyHandler =
    Box<dyn Fn(Option<AnalysisTaskKind>, &CompletionRequest) -> Option<MockReply> + Send + Sync>;

/// Mock implementation of the LlmClient trait.
///
/// Recognizes which analysis task a request belongs to and answers with a
/// valid response for that task unless told otherwise. Reply precedence:
/// queued one-shot replies, then the handler, then per-task replies, then
/// the built-in defaults.
///
/// # Example
///
/// ```rust,ignore
/// use enricher_core::testing::MockLlmClient;
///
/// let client = MockLlmClient::new();
/// client
///     .set_response(AnalysisTaskKind::Sentiment, r#"{"sentiment": "negative", "confidence": 0.9}"#)
///     .await;
/// client.fail_task(AnalysisTaskKind::Keywords, LlmError::Http("reset".into())).await;
///
/// // ... run the engine ...
/// assert_eq!(client.call_count().await, 4);
/// ```
pub struct MockLlmClient {
    replies: Arc<RwLock<HashMap<AnalysisTaskKind, MockReply>>>,
    queued: Arc<RwLock<HashMap<AnalysisTaskKind, VecDeque<MockReply>>>>,
    handler: Arc<RwLock<Option<ReplyHandler>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    health_error: Arc<RwLock<Option<LlmError>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MockLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlmClient")
            .field("replies", &"<replies>")
            .field("queued", &"<queued>")
            .field("handler", &"<handler>")
            .field("delay", &"<delay>")
            .field("calls", &"<calls>")
            .field("health_error", &"<health_error>")
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(RwLock::new(HashMap::new())),
            queued: Arc::new(RwLock::new(HashMap::new())),
            handler: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
            health_error: Arc::new(RwLock::new(None)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer every request for `kind` with `text`.
    pub async fn set_response(&self, kind: AnalysisTaskKind, text: &str) {
        self.replies
            .write()
            .await
            .insert(kind, MockReply::Text(text.to_string()));
    }

    /// Fail every request for `kind` with `error`.
    pub async fn fail_task(&self, kind: AnalysisTaskKind, error: LlmError) {
        self.replies.write().await.insert(kind, MockReply::Error(error));
    }

    /// Queue a reply used once, ahead of everything else, for `kind`.
    pub async fn push_reply(&self, kind: AnalysisTaskKind, reply: MockReply) {
        self.queued
            .write()
            .await
            .entry(kind)
            .or_default()
            .push_back(reply);
    }

    /// Decide replies dynamically. Returning `None` falls through.
    pub async fn set_handler<F>(&self, handler: F)
    where
        F: Fn(Option<AnalysisTaskKind>, &CompletionRequest) -> Option<MockReply>
            + Send
            + Sync
            + 'static,
    {
        *self.handler.write().await = Some(Box::new(handler));
    }

    /// Delay every call by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Make `health_check` fail with `error` (`None` restores a healthy provider).
    pub async fn set_health_error(&self, error: Option<LlmError>) {
        *self.health_error.write().await = error;
    }

    pub async fn reset(&self) {
        self.replies.write().await.clear();
        self.queued.write().await.clear();
        *self.handler.write().await = None;
        *self.delay.write().await = None;
        *self.health_error.write().await = None;
        self.calls.write().await.clear();
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Calls recorded for one task kind.
    pub async fn calls_for(&self, kind: AnalysisTaskKind) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.kind == Some(kind))
            .count()
    }

    /// Highest number of calls that were in flight at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn reply_for(
        &self,
        kind: Option<AnalysisTaskKind>,
        request: &CompletionRequest,
    ) -> MockReply {
        if let Some(kind) = kind {
            if let Some(reply) = self
                .queued
                .write()
                .await
                .get_mut(&kind)
                .and_then(VecDeque::pop_front)
            {
                return reply;
            }
        }

        if let Some(ref handler) = *self.handler.read().await {
            if let Some(reply) = handler(kind, request) {
                return reply;
            }
        }

        if let Some(kind) = kind {
            if let Some(reply) = self.replies.read().await.get(&kind) {
                return reply.clone();
            }
        }

        MockReply::Text(default_response(kind).to_string())
    }
}

/// Infer the task from the JSON shape the prompt asks for.
pub fn detect_task(request: &CompletionRequest) -> Option<AnalysisTaskKind> {
    let text = match request.system {
        Some(ref system) => format!("{}\n{}", system, request.prompt),
        None => request.prompt.clone(),
    };
    if text.contains("\"primary_category\"") {
        Some(AnalysisTaskKind::Category)
    } else if text.contains("\"sentiment\":") {
        Some(AnalysisTaskKind::Sentiment)
    } else if text.contains("\"entities\":") {
        Some(AnalysisTaskKind::Entities)
    } else if text.contains("\"keywords\":") {
        Some(AnalysisTaskKind::Keywords)
    } else {
        None
    }
}

fn default_response(kind: Option<AnalysisTaskKind>) -> &'static str {
    match kind {
        Some(AnalysisTaskKind::Sentiment) => {
            r#"{"sentiment": "neutral", "confidence": 0.7, "language_detected": "en"}"#
        }
        Some(AnalysisTaskKind::Entities) => {
            r#"{"entities": [{"text": "Tunis", "type": "LOCATION", "confidence": 0.8}]}"#
        }
        Some(AnalysisTaskKind::Keywords) => {
            r#"{"keywords": [{"text": "economy", "importance": 0.8}, {"text": "budget", "importance": 0.6}]}"#
        }
        Some(AnalysisTaskKind::Category) => r#"{"primary_category": "other", "confidence": 0.6}"#,
        None => "{}",
    }
}

/// Decrements the in-flight counter when a call ends, even on panic.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        match self.health_error.read().await.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let kind = detect_task(&request);
        self.calls.write().await.push(RecordedCall {
            kind,
            request: request.clone(),
            timestamp: Instant::now(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.reply_for(kind, &request).await {
            MockReply::Text(text) => Ok(CompletionResponse {
                usage: LlmUsage {
                    input_tokens: (request.prompt.len() / 4) as u32,
                    output_tokens: (text.len() / 4) as u32,
                },
                text,
                model: "mock-model".to_string(),
            }),
            MockReply::Error(error) => Err(error),
            MockReply::Panic(message) => panic!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest::new(prompt)
    }

    #[test]
    fn test_detect_task() {
        assert_eq!(
            detect_task(&request(r#"Respond with {"sentiment": "..."}"#)),
            Some(AnalysisTaskKind::Sentiment)
        );
        assert_eq!(
            detect_task(&request(r#"{"primary_category": "x"}"#)),
            Some(AnalysisTaskKind::Category)
        );
        assert_eq!(detect_task(&request("hello")), None);
    }

    #[tokio::test]
    async fn test_queued_reply_is_used_once() {
        let client = MockLlmClient::new();
        client
            .push_reply(
                AnalysisTaskKind::Keywords,
                MockReply::Error(LlmError::Http("connection reset".to_string())),
            )
            .await;
        let req = request(r#"{"keywords": []}"#);

        assert!(client.complete(req.clone()).await.is_err());
        let second = client.complete(req).await.unwrap();
        assert!(second.text.contains("economy"));
        assert_eq!(client.calls_for(AnalysisTaskKind::Keywords).await, 2);
    }

    #[tokio::test]
    async fn test_health_error_is_reported_until_cleared() {
        let client = MockLlmClient::new();
        assert!(client.health_check().await.is_ok());

        client
            .set_health_error(Some(LlmError::Http("connection refused".to_string())))
            .await;
        assert!(matches!(client.health_check().await, Err(LlmError::Http(_))));

        client.reset().await;
        assert!(client.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_handler_overrides_per_task_reply() {
        let client = MockLlmClient::new();
        client
            .set_response(AnalysisTaskKind::Sentiment, r#"{"sentiment": "positive", "confidence": 0.9}"#)
            .await;
        client
            .set_handler(|_, req| {
                req.prompt
                    .contains("broken")
                    .then(|| MockReply::Text("not json".to_string()))
            })
            .await;

        let broken = client
            .complete(request(r#"broken {"sentiment": ""}"#))
            .await
            .unwrap();
        let normal = client
            .complete(request(r#"fine {"sentiment": ""}"#))
            .await
            .unwrap();

        assert_eq!(broken.text, "not json");
        assert!(normal.text.contains("positive"));
    }
}
