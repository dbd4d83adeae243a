//! Keyword extraction task.

use std::collections::HashSet;

use serde_json::Value;

use crate::analysis::config::Sampling;
use crate::analysis::task::{
    detected_language, language_line, optional_string, require_array, require_str, require_unit,
    string_list, AnalysisTask,
};
use crate::analysis::types::{mean, AnalysisTaskKind, Keyword, KeywordsPayload, TaskPayload};

const SYSTEM_PROMPT: &str = "You extract the most significant keywords and key phrases from \
multilingual news and social media text. Answer with a single JSON object and nothing else.";

/// Function words that never make useful keywords.
const STOP_WORDS: &[&str] = &[
    // English
    "the", "a", "an", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "by",
    "from", "is", "are", "was", "were", "be", "this", "that", "it", "as",
    // French
    "le", "la", "les", "un", "une", "des", "de", "du", "et", "ou", "mais", "dans", "sur", "pour",
    "par", "avec", "est", "sont", "ce", "cette", "qui", "que",
    // Arabic
    "في", "من", "على", "إلى", "عن", "مع", "هذا", "هذه", "التي", "الذي", "و", "أو", "ثم", "قد",
];

/// Fewer keywords than this is treated as under-extraction.
const SPARSE_THRESHOLD: usize = 3;

pub struct KeywordsTask {
    sampling: Sampling,
    max_keywords: usize,
    min_importance: f32,
    min_term_length: usize,
}

impl KeywordsTask {
    pub fn new(
        sampling: Sampling,
        max_keywords: usize,
        min_importance: f32,
        min_term_length: usize,
    ) -> Self {
        Self {
            sampling,
            max_keywords,
            min_importance,
            min_term_length,
        }
    }

    fn parse_keyword(value: &Value) -> Result<Keyword, String> {
        Ok(Keyword {
            text: require_str(value, "text")?.trim().to_string(),
            importance: require_unit(value, "importance")?,
            keyword_type: optional_string(value, "type").map(|t| t.to_ascii_lowercase()),
            category: optional_string(value, "category").map(|c| c.to_ascii_lowercase()),
        })
    }

    fn keep(&self, keyword: &Keyword) -> bool {
        keyword.text.chars().count() >= self.min_term_length
            && keyword.importance >= self.min_importance
            && !is_stop_word(&keyword.text)
    }
}

fn is_stop_word(text: &str) -> bool {
    let lowered = text.to_lowercase();
    STOP_WORDS.contains(&lowered.as_str())
}

impl AnalysisTask for KeywordsTask {
    fn kind(&self) -> AnalysisTaskKind {
        AnalysisTaskKind::Keywords
    }

    fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn build_prompt(&self, text: &str, language_hint: Option<&str>) -> String {
        format!(
            r#"Extract the most important keywords and key phrases from the following text.
{}
Text:
"{}"

Respond with this JSON structure:
{{
    "keywords": [
        {{
            "text": "keyword or phrase",
            "type": "single_word|phrase|concept",
            "importance": 0.0-1.0,
            "category": "politics|economy|society|culture|sports|other"
        }}
    ],
    "main_topics": ["list", "of", "main", "topics"],
    "language_detected": "ar|fr|en"
}}

Prefer proper nouns, technical terms and multi-word expressions. Skip stop words."#,
            language_line(language_hint),
            text
        )
    }

    fn sampling(&self) -> Sampling {
        self.sampling
    }

    fn validate(&self, response: &Value) -> Result<TaskPayload, String> {
        let raw = require_array(response, "keywords")?;

        let mut keywords = Vec::with_capacity(raw.len());
        for (index, value) in raw.iter().enumerate() {
            let keyword =
                Self::parse_keyword(value).map_err(|e| format!("keywords[{}]: {}", index, e))?;
            keywords.push(keyword);
        }

        let mut seen = HashSet::new();
        keywords.retain(|k| self.keep(k) && seen.insert(k.text.to_lowercase()));
        keywords.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        keywords.truncate(self.max_keywords);

        Ok(TaskPayload::Keywords(KeywordsPayload {
            keywords,
            main_topics: string_list(response, "main_topics"),
            language_detected: detected_language(response),
        }))
    }

    fn confidence(&self, payload: &TaskPayload) -> f32 {
        let TaskPayload::Keywords(p) = payload else {
            return 0.0;
        };
        let Some(average) = mean(p.keywords.iter().map(|k| k.importance)) else {
            return 0.0;
        };
        let count = p.keywords.len() as f32;

        let kinds: HashSet<&str> = p
            .keywords
            .iter()
            .map(|k| k.keyword_type.as_deref().unwrap_or("single_word"))
            .collect();
        let categorised = p
            .keywords
            .iter()
            .filter(|k| k.category.as_deref().is_some_and(|c| c != "other"))
            .count() as f32;
        let phrases = p.keywords.iter().filter(|k| k.is_phrase()).count() as f32;

        let mut score = average;
        if kinds.len() > 1 {
            score += 0.1;
        }
        score += 0.1 * (categorised / count);
        score += 0.05 * (phrases / count);
        if p.keywords.len() < SPARSE_THRESHOLD {
            score -= 0.2;
        }
        score.clamp(0.0, 1.0)
    }
}
