use std::collections::HashSet;

use super::{ConfigError, ProjectConfig};

/// Validate the full project config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    validate_models(config)?;
    validate_request(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_models(config: &ProjectConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, model) in config.models.iter().enumerate() {
        if model.model.trim().is_empty() {
            return Err(validation_err(format!(
                "models[{index}].model cannot be empty"
            )));
        }
        if !seen.insert(model.model.as_str()) {
            return Err(validation_err(format!(
                "duplicate model name '{}'",
                model.model
            )));
        }
        if model.api_key.trim().is_empty() {
            return Err(validation_err(format!(
                "models[{index}].api_key cannot be empty"
            )));
        }
        let url = url::Url::parse(&model.url).map_err(|err| {
            validation_err(format!("models[{index}].url '{}' is invalid: {err}", model.url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(validation_err(format!(
                "models[{index}].url must use http or https, got '{}'",
                url.scheme()
            )));
        }
    }
    Ok(())
}

fn validate_request(config: &ProjectConfig) -> Result<(), ConfigError> {
    let request = &config.request;
    if !(0.0..=2.0).contains(&request.temperature) {
        return Err(validation_err(
            "request.temperature must be between 0.0 and 2.0",
        ));
    }
    if request.timeout_secs == 0 {
        return Err(validation_err("request.timeout_secs must be greater than 0"));
    }
    if request.connect_timeout_secs == 0 {
        return Err(validation_err(
            "request.connect_timeout_secs must be greater than 0",
        ));
    }
    if request.max_line_bytes < 1024 {
        return Err(validation_err(
            "request.max_line_bytes must be at least 1024",
        ));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARN", "WARNING", "ERROR", "CRITICAL", "DISABLED",
];

fn validate_log_level(config: &ProjectConfig) -> Result<(), ConfigError> {
    let level = config.logger.level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "logger.level must be one of {VALID_LOG_LEVELS:?}, got '{}'",
            config.logger.level
        )));
    }
    Ok(())
}
