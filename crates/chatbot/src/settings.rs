//! Client configuration.
//!
//! Read from a TOML file (created with defaults on first run) and overridden
//! by `CHATBOT__<SECTION>__<KEY>` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::i18n::Locale;
use crate::stream::{DEFAULT_CHUNK_SEPARATOR, StreamConfig};

pub const APP_NAME: &str = "chatbot";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub stream: StreamSettings,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
}

/// Backend location for both the JSON API and the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Timeout for request/response calls in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Appended to each streamed word. Empty for backends that send raw
    /// token deltas.
    pub chunk_separator: String,
    pub connect_timeout_secs: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_separator: DEFAULT_CHUNK_SEPARATOR.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub locale: Locale,
    /// Agent label shown before the backend picks one.
    pub default_agent: String,
    /// Greet the user when an interactive chat starts.
    pub show_welcome: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            default_agent: "supervisor".to_string(),
            show_welcome: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

impl AppConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            base_url: self.api.base_url.clone(),
            chunk_separator: self.stream.chunk_separator.clone(),
            connect_timeout: Duration::from_secs(self.stream.connect_timeout_secs),
        }
    }
}

/// Load the config file, writing defaults first if it does not exist.
pub fn load_or_init_config(path: &Path, dry_run: bool) -> Result<AppConfig> {
    if !path.exists() {
        if dry_run {
            log::info!("dry-run: would create default config at {}", path.display());
        } else {
            write_default_config(path)?;
        }
    }
    load_config(path, &env_prefix())
}

/// Merge defaults, the TOML file at `path` and environment overrides.
pub fn load_config(path: &Path, env_prefix: &str) -> Result<AppConfig> {
    let built = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix(env_prefix).separator("__"))
        .build()
        .with_context(|| format!("reading config from {}", path.display()))?;

    let mut config: AppConfig = built
        .try_deserialize()
        .with_context(|| format!("parsing config from {}", path.display()))?;

    config.api.base_url = config.api.base_url.trim_end_matches('/').to_string();
    if let Some(ref file) = config.logging.file {
        config.logging.file = Some(expand_str_path(file)?.display().to_string());
    }

    Ok(config)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let toml = toml::to_string_pretty(&AppConfig::default())
        .context("serializing default config to TOML")?;
    let mut body = format!("# Configuration for {APP_NAME}\n# File: {}\n\n", path.display());
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

/// `config.toml` in the platform config directory.
pub fn default_config_file() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME).join("config.toml"));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME).join("config.toml"));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME).join("config.toml"))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml"), "CHATBOT_TEST_UNSET").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[api]
base_url = "https://chat.example.com/"

[stream]
chunk_separator = ""

[ui]
locale = "en"
"#,
        )
        .unwrap();

        let config = load_config(&path, "CHATBOT_TEST_UNSET").unwrap();
        assert_eq!(config.api.base_url, "https://chat.example.com");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.ui.locale, Locale::En);
        assert_eq!(config.stream_config().chunk_separator, "");
        assert_eq!(config.stream_config().base_url, "https://chat.example.com");
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = load_or_init_config(&path, false).unwrap();
        assert!(path.exists());
        assert_eq!(config.ui.default_agent, "supervisor");

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("# Configuration for chatbot"));
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix(), "CHATBOT");
    }
}
