//! Task runner configuration.

use serde::{Deserialize, Serialize};

use super::types::AnalysisTaskKind;

/// Sampling parameters for one task kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Sampling {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

/// Settings shared by every task runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunnerConfig {
    #[serde(default = "default_sentiment_sampling")]
    pub sentiment: Sampling,
    #[serde(default = "default_entities_sampling")]
    pub entities: Sampling,
    #[serde(default = "default_keywords_sampling")]
    pub keywords: Sampling,
    #[serde(default = "default_category_sampling")]
    pub category: Sampling,
    /// Entities kept after deduplication.
    #[serde(default = "default_max_entities")]
    pub max_entities: usize,
    /// Keywords kept after filtering.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
    /// Keywords below this importance are dropped.
    #[serde(default = "default_min_keyword_importance")]
    pub min_keyword_importance: f32,
    #[serde(default = "default_max_secondary_categories")]
    pub max_secondary_categories: usize,
    /// Entities and keywords shorter than this are dropped.
    #[serde(default = "default_min_term_length")]
    pub min_term_length: usize,
    /// Remove HTML tags and bare URLs before analysis.
    #[serde(default = "default_strip_markup")]
    pub strip_markup: bool,
}

fn default_sentiment_sampling() -> Sampling {
    Sampling::new(0.1, 512)
}

fn default_entities_sampling() -> Sampling {
    Sampling::new(0.1, 1024)
}

fn default_keywords_sampling() -> Sampling {
    Sampling::new(0.2, 1024)
}

fn default_category_sampling() -> Sampling {
    Sampling::new(0.1, 512)
}

fn default_max_entities() -> usize {
    50
}

fn default_max_keywords() -> usize {
    30
}

fn default_min_keyword_importance() -> f32 {
    0.3
}

fn default_max_secondary_categories() -> usize {
    3
}

fn default_min_term_length() -> usize {
    2
}

fn default_strip_markup() -> bool {
    true
}

impl Default for TaskRunnerConfig {
    fn default() -> Self {
        Self {
            sentiment: default_sentiment_sampling(),
            entities: default_entities_sampling(),
            keywords: default_keywords_sampling(),
            category: default_category_sampling(),
            max_entities: default_max_entities(),
            max_keywords: default_max_keywords(),
            min_keyword_importance: default_min_keyword_importance(),
            max_secondary_categories: default_max_secondary_categories(),
            min_term_length: default_min_term_length(),
            strip_markup: default_strip_markup(),
        }
    }
}

impl TaskRunnerConfig {
    pub fn sampling(&self, kind: AnalysisTaskKind) -> Sampling {
        match kind {
            AnalysisTaskKind::Sentiment => self.sentiment,
            AnalysisTaskKind::Entities => self.entities,
            AnalysisTaskKind::Keywords => self.keywords,
            AnalysisTaskKind::Category => self.category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: TaskRunnerConfig = toml::from_str("").unwrap();
        assert_eq!(config.sampling(AnalysisTaskKind::Sentiment), Sampling::new(0.1, 512));
        assert_eq!(config.sampling(AnalysisTaskKind::Keywords).temperature, 0.2);
        assert_eq!(config.max_entities, 50);
        assert_eq!(config.min_keyword_importance, 0.3);
        assert!(config.strip_markup);
    }

    #[test]
    fn test_override_sampling_table() {
        let toml = r#"
max_keywords = 10

[entities]
temperature = 0.0
max_tokens = 2048
"#;
        let config: TaskRunnerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.entities, Sampling::new(0.0, 2048));
        assert_eq!(config.max_keywords, 10);
        assert_eq!(config.category, Sampling::new(0.1, 512));
    }
}
