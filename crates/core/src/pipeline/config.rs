//! Per-content-type processing settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::analysis::AnalysisTaskKind;
use crate::batch::BatchConfig;
use crate::content::ContentType;
use crate::enricher::ItemEnricherConfig;

/// Settings of one content type's pipeline.
///
/// A config section only overrides the fields it names; everything else
/// keeps the preset of its content type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentTypeSettings {
    pub enabled: bool,
    pub min_content_length: usize,
    pub max_content_length: usize,
    pub task_timeout_secs: u64,
    pub item_timeout_secs: u64,
    pub tasks: Vec<AnalysisTaskKind>,
    pub batch: BatchConfig,
}

/// Fields of a `[content.<type>]` section as written in the config.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentTypeOverrides {
    enabled: Option<bool>,
    min_content_length: Option<usize>,
    max_content_length: Option<usize>,
    task_timeout_secs: Option<u64>,
    item_timeout_secs: Option<u64>,
    tasks: Option<Vec<AnalysisTaskKind>>,
    batch: BatchOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BatchOverrides {
    batch_size: Option<usize>,
    max_workers: Option<usize>,
    inter_batch_delay_ms: Option<u64>,
    max_item_retries: Option<u32>,
}

impl ContentTypeOverrides {
    fn apply(self, mut settings: ContentTypeSettings) -> ContentTypeSettings {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(min) = self.min_content_length {
            settings.min_content_length = min;
        }
        if let Some(max) = self.max_content_length {
            settings.max_content_length = max;
        }
        if let Some(secs) = self.task_timeout_secs {
            settings.task_timeout_secs = secs;
        }
        if let Some(secs) = self.item_timeout_secs {
            settings.item_timeout_secs = secs;
        }
        if let Some(tasks) = self.tasks {
            settings.tasks = tasks;
        }

        let batch = &mut settings.batch;
        if let Some(size) = self.batch.batch_size {
            batch.batch_size = size;
        }
        if let Some(workers) = self.batch.max_workers {
            batch.max_workers = workers;
        }
        if let Some(delay) = self.batch.inter_batch_delay_ms {
            batch.inter_batch_delay_ms = delay;
        }
        if let Some(retries) = self.batch.max_item_retries {
            batch.max_item_retries = retries;
        }
        settings
    }
}

impl ContentTypeSettings {
    /// Long-form news articles.
    pub fn article() -> Self {
        Self {
            enabled: true,
            min_content_length: 50,
            max_content_length: 4000,
            task_timeout_secs: 30,
            item_timeout_secs: 60,
            tasks: AnalysisTaskKind::ALL.to_vec(),
            batch: BatchConfig::default().with_batch_size(10),
        }
    }

    /// Social media posts.
    pub fn post() -> Self {
        Self {
            enabled: true,
            min_content_length: 20,
            max_content_length: 2000,
            task_timeout_secs: 20,
            item_timeout_secs: 45,
            tasks: AnalysisTaskKind::ALL.to_vec(),
            batch: BatchConfig::default().with_batch_size(20),
        }
    }

    /// Comments are short; categorizing them is not worth a call.
    pub fn comment() -> Self {
        Self {
            enabled: true,
            min_content_length: 10,
            max_content_length: 1000,
            task_timeout_secs: 15,
            item_timeout_secs: 30,
            tasks: vec![
                AnalysisTaskKind::Sentiment,
                AnalysisTaskKind::Entities,
                AnalysisTaskKind::Keywords,
            ],
            batch: BatchConfig::default().with_batch_size(50),
        }
    }

    pub fn for_type(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Article => Self::article(),
            ContentType::Post => Self::post(),
            ContentType::Comment => Self::comment(),
        }
    }

    pub fn enricher_config(&self) -> ItemEnricherConfig {
        ItemEnricherConfig {
            min_content_length: self.min_content_length,
            max_content_length: self.max_content_length,
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            item_timeout: Duration::from_secs(self.item_timeout_secs),
            tasks: self.tasks.clone(),
        }
    }
}

/// Settings for every content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ContentSections")]
pub struct ContentSettings {
    pub article: ContentTypeSettings,
    pub post: ContentTypeSettings,
    pub comment: ContentTypeSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentSections {
    article: ContentTypeOverrides,
    post: ContentTypeOverrides,
    comment: ContentTypeOverrides,
}

impl From<ContentSections> for ContentSettings {
    fn from(sections: ContentSections) -> Self {
        Self {
            article: sections.article.apply(ContentTypeSettings::article()),
            post: sections.post.apply(ContentTypeSettings::post()),
            comment: sections.comment.apply(ContentTypeSettings::comment()),
        }
    }
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            article: ContentTypeSettings::article(),
            post: ContentTypeSettings::post(),
            comment: ContentTypeSettings::comment(),
        }
    }
}

impl ContentSettings {
    pub fn get(&self, content_type: ContentType) -> &ContentTypeSettings {
        match content_type {
            ContentType::Article => &self.article,
            ContentType::Post => &self.post,
            ContentType::Comment => &self.comment,
        }
    }

    pub fn get_mut(&mut self, content_type: ContentType) -> &mut ContentTypeSettings {
        match content_type {
            ContentType::Article => &mut self.article,
            ContentType::Post => &mut self.post,
            ContentType::Comment => &mut self.comment,
        }
    }

    /// Enabled content types in pipeline order.
    pub fn enabled_types(&self) -> Vec<ContentType> {
        ContentType::ALL
            .into_iter()
            .filter(|ct| self.get(*ct).enabled)
            .collect()
    }
}
