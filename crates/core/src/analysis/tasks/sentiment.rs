//! Sentiment analysis task.

use serde_json::Value;

use crate::analysis::config::Sampling;
use crate::analysis::task::{
    detected_language, language_line, optional_string, require_str, require_unit, string_list,
    AnalysisTask, KNOWN_LANGUAGES,
};
use crate::analysis::types::{AnalysisTaskKind, Sentiment, SentimentPayload, TaskPayload};

const SYSTEM_PROMPT: &str = "You analyze the sentiment of news articles, social media posts and \
comments written in Arabic, French or English. Answer with a single JSON object and nothing else.";

pub struct SentimentTask {
    sampling: Sampling,
}

impl SentimentTask {
    pub fn new(sampling: Sampling) -> Self {
        Self { sampling }
    }
}

impl AnalysisTask for SentimentTask {
    fn kind(&self) -> AnalysisTaskKind {
        AnalysisTaskKind::Sentiment
    }

    fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn build_prompt(&self, text: &str, language_hint: Option<&str>) -> String {
        format!(
            r#"Analyze the sentiment of the following text.
{}
Text:
"{}"

Respond with this JSON structure:
{{
    "sentiment": "positive|negative|neutral",
    "confidence": 0.0-1.0,
    "reasoning": "one sentence explaining the label",
    "emotions": ["optional", "list", "of", "emotions"],
    "language_detected": "ar|fr|en"
}}

Take sarcasm, negation and cultural context into account."#,
            language_line(language_hint),
            text
        )
    }

    fn sampling(&self) -> Sampling {
        self.sampling
    }

    fn validate(&self, response: &Value) -> Result<TaskPayload, String> {
        let label = require_str(response, "sentiment")?;
        let sentiment = match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            "neutral" => Sentiment::Neutral,
            other => {
                return Err(format!(
                    "sentiment must be positive, negative or neutral, got '{}'",
                    other
                ))
            }
        };
        let confidence = require_unit(response, "confidence")?;

        Ok(TaskPayload::Sentiment(SentimentPayload {
            sentiment,
            score: sentiment.score(),
            confidence,
            reasoning: optional_string(response, "reasoning"),
            emotions: string_list(response, "emotions"),
            language_detected: detected_language(response),
        }))
    }

    fn confidence(&self, payload: &TaskPayload) -> f32 {
        let TaskPayload::Sentiment(p) = payload else {
            return 0.0;
        };
        let mut score = p.confidence;
        if p.reasoning.as_ref().is_some_and(|r| r.chars().count() > 10) {
            score += 0.1;
        }
        if !p.emotions.is_empty() {
            score += 0.05;
        }
        if p
            .language_detected
            .as_deref()
            .is_some_and(|l| KNOWN_LANGUAGES.contains(&l))
        {
            score += 0.05;
        }
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> SentimentTask {
        SentimentTask::new(Sampling::new(0.1, 512))
    }

    #[test]
    fn test_validate_minimal_response() {
        let payload = task()
            .validate(&json!({"sentiment": "Negative", "confidence": 0.7}))
            .unwrap();
        let TaskPayload::Sentiment(p) = payload else {
            panic!("wrong payload kind");
        };
        assert_eq!(p.sentiment, Sentiment::Negative);
        assert_eq!(p.score, -1);
        assert!(p.emotions.is_empty());
    }

    #[test]
    fn test_validate_rejects_unknown_label() {
        let err = task()
            .validate(&json!({"sentiment": "mixed", "confidence": 0.7}))
            .unwrap_err();
        assert!(err.contains("mixed"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        assert!(task()
            .validate(&json!({"sentiment": "positive", "confidence": 7}))
            .is_err());
    }

    #[test]
    fn test_confidence_without_extras_is_reported_value() {
        let t = task();
        let payload = t
            .validate(&json!({"sentiment": "positive", "confidence": 0.8}))
            .unwrap();
        assert!((t.confidence(&payload) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_boosts_are_clamped() {
        let t = task();
        let payload = t
            .validate(&json!({
                "sentiment": "positive",
                "confidence": 0.95,
                "reasoning": "Celebrates the team's victory",
                "emotions": ["joy"],
                "language_detected": "EN"
            }))
            .unwrap();
        assert_eq!(t.confidence(&payload), 1.0);
    }

    #[test]
    fn test_prompt_contains_text_and_hint() {
        let prompt = task().build_prompt("Great match tonight", Some("en"));
        assert!(prompt.contains("Great match tonight"));
        assert!(prompt.contains("\"en\""));
    }
}
