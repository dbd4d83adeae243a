//! Named entity extraction task.

use std::collections::HashSet;

use serde_json::Value;

use crate::analysis::config::Sampling;
use crate::analysis::task::{
    detected_language, language_line, optional_string, require_array, require_str, require_unit,
    AnalysisTask,
};
use crate::analysis::types::{
    mean, AnalysisTaskKind, EntitiesPayload, Entity, EntityType, TaskPayload,
};

const SYSTEM_PROMPT: &str = "You extract named entities (people, organizations, locations) from \
multilingual news and social media text. Answer with a single JSON object and nothing else.";

/// More entities than this is treated as over-extraction.
const CROWDED_THRESHOLD: usize = 20;

pub struct EntitiesTask {
    sampling: Sampling,
    max_entities: usize,
    min_term_length: usize,
}

impl EntitiesTask {
    pub fn new(sampling: Sampling, max_entities: usize, min_term_length: usize) -> Self {
        Self {
            sampling,
            max_entities,
            min_term_length,
        }
    }

    fn parse_entity(value: &Value) -> Result<Entity, String> {
        let text = require_str(value, "text")?.trim().to_string();
        let type_name = require_str(value, "type")?;
        let entity_type = parse_entity_type(type_name)
            .ok_or_else(|| format!("unknown entity type '{}'", type_name))?;
        let confidence = require_unit(value, "confidence")?;
        Ok(Entity {
            text,
            entity_type,
            confidence,
            context: optional_string(value, "context"),
        })
    }
}

fn parse_entity_type(name: &str) -> Option<EntityType> {
    match name.trim().to_ascii_uppercase().as_str() {
        "PERSON" | "PER" => Some(EntityType::Person),
        "ORGANIZATION" | "ORGANISATION" | "ORG" => Some(EntityType::Organization),
        "LOCATION" | "LOC" | "GPE" => Some(EntityType::Location),
        "MISC" => Some(EntityType::Misc),
        _ => None,
    }
}

impl AnalysisTask for EntitiesTask {
    fn kind(&self) -> AnalysisTaskKind {
        AnalysisTaskKind::Entities
    }

    fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn build_prompt(&self, text: &str, language_hint: Option<&str>) -> String {
        format!(
            r#"Extract the named entities mentioned in the following text.
{}
Text:
"{}"

Respond with this JSON structure:
{{
    "entities": [
        {{
            "text": "entity as written in the text",
            "type": "PERSON|ORGANIZATION|LOCATION|MISC",
            "confidence": 0.0-1.0,
            "context": "short phrase where it appears"
        }}
    ],
    "language_detected": "ar|fr|en"
}}

Keep names in their original script. Do not translate them."#,
            language_line(language_hint),
            text
        )
    }

    fn sampling(&self) -> Sampling {
        self.sampling
    }

    fn validate(&self, response: &Value) -> Result<TaskPayload, String> {
        let raw = require_array(response, "entities")?;

        let mut seen = HashSet::new();
        let mut entities = Vec::new();
        for (index, value) in raw.iter().enumerate() {
            let entity =
                Self::parse_entity(value).map_err(|e| format!("entities[{}]: {}", index, e))?;
            if entity.text.chars().count() < self.min_term_length {
                continue;
            }
            if !seen.insert((entity.text.to_lowercase(), entity.entity_type)) {
                continue;
            }
            entities.push(entity);
            if entities.len() >= self.max_entities {
                break;
            }
        }

        Ok(TaskPayload::Entities(EntitiesPayload {
            entities,
            language_detected: detected_language(response),
        }))
    }

    fn confidence(&self, payload: &TaskPayload) -> f32 {
        let TaskPayload::Entities(p) = payload else {
            return 0.0;
        };
        let Some(average) = mean(p.entities.iter().map(|e| e.confidence)) else {
            return 0.0;
        };
        let with_context = p.entities.iter().filter(|e| e.context.is_some()).count();
        let mut score = average + 0.05 * (with_context as f32 / p.entities.len() as f32);
        if p.entities.len() > CROWDED_THRESHOLD {
            score -= 0.1;
        }
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> EntitiesTask {
        EntitiesTask::new(Sampling::new(0.1, 1024), 50, 2)
    }

    fn entities(payload: &TaskPayload) -> &[Entity] {
        match payload {
            TaskPayload::Entities(p) => &p.entities,
            _ => panic!("wrong payload kind"),
        }
    }

    #[test]
    fn test_validate_and_deduplicate() {
        let payload = task()
            .validate(&json!({
                "entities": [
                    {"text": "Tunis", "type": "LOCATION", "confidence": 0.9},
                    {"text": "tunis ", "type": "LOC", "confidence": 0.8},
                    {"text": "Tunis", "type": "ORGANIZATION", "confidence": 0.4},
                    {"text": "X", "type": "PERSON", "confidence": 0.9}
                ]
            }))
            .unwrap();
        let list = entities(&payload);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].entity_type, EntityType::Location);
        assert_eq!(list[1].entity_type, EntityType::Organization);
    }

    #[test]
    fn test_validate_caps_entity_count() {
        let many: Vec<Value> = (0..80)
            .map(|i| json!({"text": format!("Name {}", i), "type": "PERSON", "confidence": 0.5}))
            .collect();
        let payload = task().validate(&json!({ "entities": many })).unwrap();
        assert_eq!(entities(&payload).len(), 50);
    }

    #[test]
    fn test_validate_rejects_bad_entry() {
        let err = task()
            .validate(&json!({
                "entities": [{"text": "Paris", "type": "CITYSTATE", "confidence": 0.5}]
            }))
            .unwrap_err();
        assert!(err.starts_with("entities[0]"));
    }

    #[test]
    fn test_validate_requires_array() {
        assert!(task().validate(&json!({"entities": "none"})).is_err());
    }

    #[test]
    fn test_confidence_rewards_context() {
        let t = task();
        let payload = t
            .validate(&json!({
                "entities": [
                    {"text": "UGTT", "type": "ORGANIZATION", "confidence": 0.8, "context": "the union said"},
                    {"text": "Sfax", "type": "LOCATION", "confidence": 0.6}
                ]
            }))
            .unwrap();
        let expected = 0.7 + 0.05 * 0.5;
        assert!((t.confidence(&payload) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_penalizes_crowded_output() {
        let t = task();
        let many: Vec<Value> = (0..25)
            .map(|i| json!({"text": format!("Person {}", i), "type": "PERSON", "confidence": 0.5}))
            .collect();
        let payload = t.validate(&json!({ "entities": many })).unwrap();
        assert!((t.confidence(&payload) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_of_empty_list_is_zero() {
        let t = task();
        let payload = t.validate(&json!({"entities": []})).unwrap();
        assert_eq!(t.confidence(&payload), 0.0);
    }
}
