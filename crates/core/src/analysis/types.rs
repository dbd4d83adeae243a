//! Task kinds, payloads and the task result envelope.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::llm::LlmUsage;

/// One independent kind of annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTaskKind {
    Sentiment,
    Entities,
    Keywords,
    Category,
}

impl AnalysisTaskKind {
    pub const ALL: [AnalysisTaskKind; 4] = [
        AnalysisTaskKind::Sentiment,
        AnalysisTaskKind::Entities,
        AnalysisTaskKind::Keywords,
        AnalysisTaskKind::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisTaskKind::Sentiment => "sentiment",
            AnalysisTaskKind::Entities => "entities",
            AnalysisTaskKind::Keywords => "keywords",
            AnalysisTaskKind::Category => "category",
        }
    }
}

impl fmt::Display for AnalysisTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisTaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentiment" => Ok(AnalysisTaskKind::Sentiment),
            "entities" | "ner" => Ok(AnalysisTaskKind::Entities),
            "keywords" => Ok(AnalysisTaskKind::Keywords),
            "category" | "categories" => Ok(AnalysisTaskKind::Category),
            other => Err(format!("Unknown analysis task: {}", other)),
        }
    }
}

/// Outcome of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failed,
    Skipped,
}

/// Why a task did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Provider did not answer within the task timeout, or the item deadline passed.
    Timeout,
    /// Network-level failure talking to the provider.
    Transport,
    /// Provider answered with an error status.
    Api,
    /// Response was not JSON or did not have the expected shape.
    MalformedResponse,
    /// Response parsed but failed field or range checks.
    SchemaMismatch,
    /// No rate limiter permit was available.
    RateLimited,
    /// Nothing left to analyze after preprocessing.
    EmptyInput,
    /// Provider is not configured.
    NotConfigured,
}

impl TaskErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskErrorKind::Timeout => "timeout",
            TaskErrorKind::Transport => "transport",
            TaskErrorKind::Api => "api",
            TaskErrorKind::MalformedResponse => "malformed_response",
            TaskErrorKind::SchemaMismatch => "schema_mismatch",
            TaskErrorKind::RateLimited => "rate_limited",
            TaskErrorKind::EmptyInput => "empty_input",
            TaskErrorKind::NotConfigured => "not_configured",
        }
    }

    /// Provider errors worth resubmitting the item for.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskErrorKind::Timeout
                | TaskErrorKind::Transport
                | TaskErrorKind::Api
                | TaskErrorKind::MalformedResponse
                | TaskErrorKind::SchemaMismatch
        )
    }
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error carried by a non-successful task result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Signed score: +1, -1 or 0.
    pub fn score(&self) -> i8 {
        match self {
            Sentiment::Positive => 1,
            Sentiment::Negative => -1,
            Sentiment::Neutral => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentPayload {
    pub sentiment: Sentiment,
    pub score: i8,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emotions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_detected: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Misc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitiesPayload {
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_detected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    pub importance: f32,
    /// "single_word", "phrase" or "concept".
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub keyword_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Keyword {
    pub fn is_phrase(&self) -> bool {
        self.keyword_type.as_deref() == Some("phrase") || self.text.split_whitespace().nth(1).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordsPayload {
    pub keywords: Vec<Keyword>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub main_topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_detected: Option<String>,
}

/// Closed set of topic categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Politics,
    Economy,
    Society,
    Culture,
    Sports,
    Education,
    Health,
    Technology,
    Environment,
    Security,
    International,
    Regional,
    Other,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::Politics,
        Category::Economy,
        Category::Society,
        Category::Culture,
        Category::Sports,
        Category::Education,
        Category::Health,
        Category::Technology,
        Category::Environment,
        Category::Security,
        Category::International,
        Category::Regional,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "politics",
            Category::Economy => "economy",
            Category::Society => "society",
            Category::Culture => "culture",
            Category::Sports => "sports",
            Category::Education => "education",
            Category::Health => "health",
            Category::Technology => "technology",
            Category::Environment => "environment",
            Category::Security => "security",
            Category::International => "international",
            Category::Regional => "regional",
            Category::Other => "other",
        }
    }

    /// Case-insensitive lookup; accepts "sport" for sports.
    pub fn parse(name: &str) -> Option<Category> {
        let name = name.trim().to_ascii_lowercase();
        if name == "sport" {
            return Some(Category::Sports);
        }
        Category::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPayload {
    pub primary_category: Category,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_categories: Vec<Category>,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_detected: Option<String>,
}

/// Validated payload of a successful task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    Sentiment(SentimentPayload),
    Entities(EntitiesPayload),
    Keywords(KeywordsPayload),
    Category(CategoryPayload),
}

impl TaskPayload {
    pub fn kind(&self) -> AnalysisTaskKind {
        match self {
            TaskPayload::Sentiment(_) => AnalysisTaskKind::Sentiment,
            TaskPayload::Entities(_) => AnalysisTaskKind::Entities,
            TaskPayload::Keywords(_) => AnalysisTaskKind::Keywords,
            TaskPayload::Category(_) => AnalysisTaskKind::Category,
        }
    }

    /// Scalar this payload contributes to the item's overall confidence.
    ///
    /// Entities and keywords contribute the mean of their per-entry scores
    /// and nothing when empty; the other kinds contribute the task confidence.
    pub fn item_score(&self, task_confidence: f32) -> Option<f32> {
        match self {
            TaskPayload::Entities(p) => mean(p.entities.iter().map(|e| e.confidence)),
            TaskPayload::Keywords(p) => mean(p.keywords.iter().map(|k| k.importance)),
            TaskPayload::Sentiment(_) | TaskPayload::Category(_) => Some(task_confidence),
        }
    }
}

pub(crate) fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f32)
    }
}

// ============================================================================
// Result envelope
// ============================================================================

/// Diagnostics attached to every task result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Characters sent to the provider after preprocessing.
    pub input_chars: usize,
    /// Characters before truncation.
    pub original_chars: usize,
    /// Whether the input was cut to the configured maximum.
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<LlmUsage>,
}

/// Result of one task for one item. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub kind: AnalysisTaskKind,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TaskPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Provider output kept for diagnostics when validation fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl TaskResult {
    pub fn success(payload: TaskPayload, confidence: f32, duration_ms: u64) -> Self {
        Self {
            kind: payload.kind(),
            status: TaskStatus::Success,
            payload: Some(payload),
            confidence: Some(confidence.clamp(0.0, 1.0)),
            duration_ms,
            error: None,
            raw_response: None,
            metadata: TaskMetadata::default(),
        }
    }

    pub fn failed(kind: AnalysisTaskKind, error: TaskError, duration_ms: u64) -> Self {
        Self {
            kind,
            status: TaskStatus::Failed,
            payload: None,
            confidence: None,
            duration_ms,
            error: Some(error),
            raw_response: None,
            metadata: TaskMetadata::default(),
        }
    }

    pub fn skipped(kind: AnalysisTaskKind, error: TaskError) -> Self {
        Self {
            kind,
            status: TaskStatus::Skipped,
            payload: None,
            confidence: None,
            duration_ms: 0,
            error: Some(error),
            raw_response: None,
            metadata: TaskMetadata::default(),
        }
    }

    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn error_kind(&self) -> Option<TaskErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Scalar contributed to the item's overall confidence, if any.
    pub fn item_score(&self) -> Option<f32> {
        if !self.is_success() {
            return None;
        }
        let payload = self.payload.as_ref()?;
        payload.item_score(self.confidence.unwrap_or(0.0))
    }
}
