use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// `ENRICHER_LLM__MODEL=llama3` overrides `llm.model`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("ENRICHER_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisTaskKind;
    use figment::providers::Serialized;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000

[content.article]
min_content_length = 80
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.content.article.min_content_length, 80);
        assert_eq!(config.content.article.batch.batch_size, 10);
    }

    #[test]
    fn test_load_config_from_str_invalid() {
        let toml = r#"
[llm]
provider = "openai"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/enricher.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[database]
path = "/tmp/enricher-test.db"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.database.path.to_string_lossy(), "/tmp/enricher-test.db");
    }

    #[test]
    fn test_single_override_keeps_type_preset() {
        // A lone nested key, as `ENRICHER_CONTENT__COMMENT__TASK_TIMEOUT_SECS` produces.
        let config: Config = Figment::new()
            .merge(Toml::string("[server]\nport = 3000\n"))
            .merge(Serialized::default("content.comment.task_timeout_secs", 12))
            .extract()
            .unwrap();

        let comment = &config.content.comment;
        assert_eq!(comment.task_timeout_secs, 12);
        assert_eq!(comment.item_timeout_secs, 30);
        assert_eq!(comment.min_content_length, 10);
        assert_eq!(comment.batch.batch_size, 50);
        assert!(!comment.tasks.contains(&AnalysisTaskKind::Category));
    }
}
