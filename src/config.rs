//! Configuration loader and validator for the operations backend.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub finance: Finance,
    #[serde(default)]
    pub bootstrap: Bootstrap,
    #[serde(default)]
    pub contact: Option<Contact>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Refresh interval for `watch`.
    pub poll_interval_ms: u64,
}

/// Defaults applied when documents are created without explicit values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finance {
    /// Percent, e.g. 20.0 for 20 %.
    pub default_tax_rate: f64,
    pub margin_target_percent: f64,
}

/// Retry policy for optional services brought up after the context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bootstrap {
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// `None` retries until the service comes up.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_retry_interval_ms(),
            max_attempts: None,
        }
    }
}

fn default_retry_interval_ms() -> u64 {
    1500
}

/// Public contact-form relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub endpoint: String,
    #[serde(default = "default_contact_timeout")]
    pub timeout_seconds: u64,
}

fn default_contact_timeout() -> u64 {
    15
}

impl App {
    /// Expand a leading `~/` in `data_dir`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Bootstrap {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Contact {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        let dir = self.app.resolved_data_dir();
        if dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(dir)
    }

    /// Default SQLite URL under the data directory; `DATABASE_URL` wins when set.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!("sqlite://{}/rangeops.db", self.app.resolved_data_dir())
        })
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn is_percent(value: f64) -> bool {
    value.is_finite() && (0.0..=100.0).contains(&value)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }

    if !is_percent(cfg.finance.default_tax_rate) {
        return Err(ConfigError::Invalid("finance.default_tax_rate must be within 0..=100"));
    }
    if !is_percent(cfg.finance.margin_target_percent) {
        return Err(ConfigError::Invalid("finance.margin_target_percent must be within 0..=100"));
    }

    if cfg.bootstrap.retry_interval_ms == 0 {
        return Err(ConfigError::Invalid("bootstrap.retry_interval_ms must be > 0"));
    }
    if cfg.bootstrap.max_attempts == Some(0) {
        return Err(ConfigError::Invalid("bootstrap.max_attempts must be > 0 when set"));
    }

    if let Some(contact) = &cfg.contact {
        if contact.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("contact.endpoint must be non-empty"));
        }
        if contact.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("contact.timeout_seconds must be > 0"));
        }
    }

    Ok(())
}

/// Returns the example YAML shipped with the binary (`rangeops init-config`).
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 5000

finance:
  default_tax_rate: 20.0
  margin_target_percent: 35.0

bootstrap:
  retry_interval_ms: 1500

contact:
  endpoint: "https://example.com/api/contact"
  timeout_seconds: 15
"#
}
