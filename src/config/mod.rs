pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::stream::DEFAULT_MAX_LINE_BYTES;

use self::validation::validate_config;

/// Environment variable naming the application home directory.
pub const HOME_ENV: &str = "SPARROW_CLI_HOME";
/// Older spelling of [`HOME_ENV`], still honoured.
pub const LEGACY_HOME_ENV: &str = "SparrowCliHome";
/// Directory under `$HOME` used when no home is configured.
pub const DEFAULT_HOME_DIR: &str = ".sparrow-cli";
/// Config file location relative to the home directory.
pub const CONFIG_FILE: &str = "config/sparrow_cli_config.yaml";
/// Log directory relative to the home directory.
pub const LOG_DIR: &str = "logs";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Sparrow, a concise and helpful assistant running in a terminal.";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Cannot locate home directory: set {HOME_ENV} or HOME")]
    NoHome,
    #[error("No model configured; add one under `models` in {0}")]
    NoModel(String),
    #[error("Unknown model '{0}'")]
    UnknownModel(String),
}

/// One chat completion endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub api_key: String,
    pub url: String,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("url", &self.url)
            .finish()
    }
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Log sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub rotation: LogRotation,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_max_backups() -> usize {
    7
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            rotation: LogRotation::default(),
            max_backups: default_max_backups(),
        }
    }
}

/// Per-request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_temperature() -> f64 {
    0.6
}
fn default_timeout() -> u64 {
    180
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            system_prompt: default_system_prompt(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub request: RequestConfig,
}

impl ProjectConfig {
    /// Pick the model named `name`, or the first configured model.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownModel`] when `name` matches nothing and
    /// [`ConfigError::NoModel`] when no model is configured at all.
    pub fn select_model(&self, name: Option<&str>) -> Result<&ModelConfig, ConfigError> {
        match name {
            Some(name) => self
                .models
                .iter()
                .find(|model| model.model == name)
                .ok_or_else(|| ConfigError::UnknownModel(name.to_string())),
            None => self
                .models
                .first()
                .ok_or_else(|| ConfigError::NoModel(CONFIG_FILE.to_string())),
        }
    }
}

/// Resolve the home directory from the process environment.
///
/// # Errors
///
/// Returns [`ConfigError::NoHome`] when neither the home variables nor `HOME`
/// are set.
pub fn resolve_home() -> Result<PathBuf, ConfigError> {
    resolve_home_with(|key| std::env::var(key).ok())
}

/// Resolve the home directory using `lookup` for environment access.
///
/// # Errors
///
/// Returns [`ConfigError::NoHome`] when nothing usable is found.
pub fn resolve_home_with<F>(lookup: F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    if let Some(home) = non_empty(HOME_ENV).or_else(|| non_empty(LEGACY_HOME_ENV)) {
        return Ok(PathBuf::from(home));
    }
    non_empty("HOME")
        .map(|home| Path::new(&home).join(DEFAULT_HOME_DIR))
        .ok_or(ConfigError::NoHome)
}

#[must_use]
pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

#[must_use]
pub fn log_dir(home: &Path) -> PathBuf {
    home.join(LOG_DIR)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: ProjectConfig = if contents.trim().is_empty() {
        ProjectConfig::default()
    } else {
        serde_yaml::from_str(&contents)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Load the config under `home`, writing a default file first if none exists.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the file cannot be created, read, parsed or
/// validated.
pub fn load_or_init_config(home: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = config_path(home);
    if !path.exists() {
        write_default_config(&path)?;
        tracing::info!("created default config at {}", path.display());
    }
    load_config(&path)
}

fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(&ProjectConfig::default())?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(yaml.as_bytes())?;
    file.sync_all()?;
    Ok(())
}
