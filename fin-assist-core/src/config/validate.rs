//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    let url = config.backend.url.trim();
    if url.is_empty() {
        errors.push("backend.url must not be empty".to_string());
    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push("backend.url must start with http:// or https://".to_string());
    }
    if config.backend.timeout_secs == 0 {
        errors.push("backend.timeout_secs must be > 0".to_string());
    }

    if config.context.max_recent == 0 {
        errors.push("context.max_recent must be > 0".to_string());
    }
    if config.context.topic_chars == 0 {
        errors.push("context.topic_chars must be > 0".to_string());
    }
    if config.context.assistant_chars == 0 {
        errors.push("context.assistant_chars must be > 0".to_string());
    }

    let format = config.logging.format.to_ascii_lowercase();
    if format != "text" && format != "json" {
        errors.push("logging.format must be one of: text, json".to_string());
    }
    if config.logging.dir.trim().is_empty() {
        errors.push("logging.dir must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
