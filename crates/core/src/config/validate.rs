use super::{types::Config, ConfigError};
use crate::batch::MAX_WORKERS;
use crate::content::ContentType;
use crate::llm::LlmProvider;

/// Validate configuration.
///
/// Rejects settings that would make a run misbehave rather than fail:
/// zero-sized pools or windows, inverted length or timeout bounds, and an
/// Anthropic provider without a key.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.llm.model.trim().is_empty() {
        return Err(invalid("llm.model cannot be empty"));
    }
    if config.llm.provider == LlmProvider::Anthropic
        && config.llm.api_key.as_ref().map_or(true, |k| k.is_empty())
    {
        return Err(invalid("llm.api_key is required for the anthropic provider"));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.window_secs == 0 {
        return Err(invalid("rate_limit.window_secs cannot be 0"));
    }
    if rate_limit.global_requests_per_minute == Some(0) {
        return Err(invalid("rate_limit.global_requests_per_minute cannot be 0"));
    }

    for content_type in ContentType::ALL {
        if rate_limit.requests_per_minute(content_type) == 0 {
            return Err(invalid(format!(
                "rate_limit.{}_requests_per_minute cannot be 0",
                content_type
            )));
        }

        let settings = config.content.get(content_type);
        let section = format!("content.{}", content_type);

        if settings.batch.batch_size == 0 {
            return Err(invalid(format!("{}.batch.batch_size cannot be 0", section)));
        }
        if settings.batch.max_workers == 0 {
            return Err(invalid(format!("{}.batch.max_workers cannot be 0", section)));
        }
        if settings.batch.max_workers > MAX_WORKERS {
            return Err(invalid(format!(
                "{}.batch.max_workers cannot exceed {}",
                section, MAX_WORKERS
            )));
        }
        if settings.task_timeout_secs == 0 {
            return Err(invalid(format!("{}.task_timeout_secs cannot be 0", section)));
        }
        if settings.item_timeout_secs < settings.task_timeout_secs {
            return Err(invalid(format!(
                "{}.item_timeout_secs ({}) must be at least task_timeout_secs ({})",
                section, settings.item_timeout_secs, settings.task_timeout_secs
            )));
        }
        if settings.min_content_length > settings.max_content_length {
            return Err(invalid(format!(
                "{}.min_content_length ({}) exceeds max_content_length ({})",
                section, settings.min_content_length, settings.max_content_length
            )));
        }
        if settings.enabled && settings.tasks.is_empty() {
            return Err(invalid(format!("{}.tasks cannot be empty when enabled", section)));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(config: &Config, needle: &str) {
        match validate_config(config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains(needle), "unexpected message: {}", msg)
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        assert_invalid(&config, "server.port");
    }

    #[test]
    fn test_validate_anthropic_requires_key() {
        let mut config = Config::default();
        config.llm.provider = LlmProvider::Anthropic;
        assert_invalid(&config, "api_key");

        config.llm.api_key = Some("sk-test".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = Config::default();
        config.content.post.batch.max_workers = 0;
        assert_invalid(&config, "content.post.batch.max_workers");
    }

    #[test]
    fn test_validate_too_many_workers_fails() {
        let mut config = Config::default();
        config.content.article.batch.max_workers = MAX_WORKERS + 1;
        assert_invalid(&config, "content.article.batch.max_workers");
    }

    #[test]
    fn test_validate_zero_rate_fails() {
        let mut config = Config::default();
        config.rate_limit.comment_requests_per_minute = 0;
        assert_invalid(&config, "comment_requests_per_minute");
    }

    #[test]
    fn test_validate_item_timeout_below_task_timeout_fails() {
        let mut config = Config::default();
        config.content.article.item_timeout_secs = 10;
        assert_invalid(&config, "item_timeout_secs");
    }

    #[test]
    fn test_validate_inverted_lengths_fail() {
        let mut config = Config::default();
        config.content.comment.min_content_length = 5000;
        assert_invalid(&config, "min_content_length");
    }

    #[test]
    fn test_validate_empty_tasks() {
        let mut config = Config::default();
        config.content.article.tasks.clear();
        assert_invalid(&config, "content.article.tasks");

        config.content.article.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
