//! Topic category classification task.

use serde_json::Value;

use crate::analysis::config::Sampling;
use crate::analysis::task::{
    detected_language, language_line, optional_string, require_str, require_unit, string_list,
    AnalysisTask,
};
use crate::analysis::types::{AnalysisTaskKind, Category, CategoryPayload, TaskPayload};

const SYSTEM_PROMPT: &str = "You classify multilingual news and social media text into topic \
categories. Answer with a single JSON object and nothing else.";

pub struct CategoryTask {
    sampling: Sampling,
    max_secondary: usize,
}

impl CategoryTask {
    pub fn new(sampling: Sampling, max_secondary: usize) -> Self {
        Self {
            sampling,
            max_secondary,
        }
    }
}

impl AnalysisTask for CategoryTask {
    fn kind(&self) -> AnalysisTaskKind {
        AnalysisTaskKind::Category
    }

    fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn build_prompt(&self, text: &str, language_hint: Option<&str>) -> String {
        let categories = Category::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            r#"Classify the following text into topic categories.
{}
Text:
"{}"

Available categories: {}

Respond with this JSON structure:
{{
    "primary_category": "one of the available categories",
    "secondary_categories": ["up to {} other categories"],
    "confidence": 0.0-1.0,
    "reasoning": "brief explanation",
    "language_detected": "ar|fr|en"
}}"#,
            language_line(language_hint),
            text,
            categories,
            self.max_secondary
        )
    }

    fn sampling(&self) -> Sampling {
        self.sampling
    }

    fn validate(&self, response: &Value) -> Result<TaskPayload, String> {
        let name = require_str(response, "primary_category")?;
        let primary_category =
            Category::parse(name).ok_or_else(|| format!("unknown category '{}'", name))?;
        let confidence = require_unit(response, "confidence")?;

        let mut secondary_categories: Vec<Category> = Vec::new();
        for category in string_list(response, "secondary_categories")
            .iter()
            .filter_map(|name| Category::parse(name))
        {
            if category != primary_category && !secondary_categories.contains(&category) {
                secondary_categories.push(category);
            }
        }
        secondary_categories.truncate(self.max_secondary);

        Ok(TaskPayload::Category(CategoryPayload {
            primary_category,
            secondary_categories,
            confidence,
            reasoning: optional_string(response, "reasoning"),
            language_detected: detected_language(response),
        }))
    }

    fn confidence(&self, payload: &TaskPayload) -> f32 {
        let TaskPayload::Category(p) = payload else {
            return 0.0;
        };
        let mut score = p.confidence;
        if p.reasoning.as_ref().is_some_and(|r| r.chars().count() > 20) {
            score += 0.1;
        }
        score += 0.05 * p.secondary_categories.len() as f32;
        if p.confidence < 0.3 {
            score -= 0.1;
        }
        score.clamp(0.0, 1.0)
    }
}
