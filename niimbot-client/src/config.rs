//! Engine configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via NIIMBOT_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default read chunk size for the serial link.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 256;

/// Minimum read chunk size.
pub const MIN_READ_BUFFER_SIZE: usize = 16;

/// Maximum read chunk size.
pub const MAX_READ_BUFFER_SIZE: usize = 4096;

/// Printer engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// How long a dispatched command waits for its acknowledgement.
    pub response_timeout_ms: u64,
    /// Pause after each image row frame.
    pub line_delay_ms: u64,
    /// Pause between print status polls.
    pub poll_interval_ms: u64,
    /// Print status polls before giving up on the page counter.
    pub max_poll_attempts: u32,
    /// Bytes requested per read from the link.
    pub read_buffer_size: usize,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 5000,
            line_delay_ms: 10,
            poll_interval_ms: 500,
            max_poll_attempts: 30,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl PrinterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from `path` or `NIIMBOT_CONFIG`, then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("NIIMBOT_CONFIG") {
                Ok(path) => Self::from_file(path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
    }

    fn from_yaml(content: &str) -> Result<Self, String> {
        let mut config: PrinterConfig = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        config.read_buffer_size = clamp_read_buffer(config.read_buffer_size);
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = lookup("NIIMBOT_RESPONSE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.response_timeout_ms = ms;
        }

        if let Some(ms) = lookup("NIIMBOT_LINE_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.line_delay_ms = ms;
        }

        if let Some(ms) = lookup("NIIMBOT_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = ms;
        }

        if let Some(n) = lookup("NIIMBOT_MAX_POLL_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.max_poll_attempts = n;
        }
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "response_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_poll_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = clamp_read_buffer(size);
        self
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn line_delay(&self) -> Duration {
        Duration::from_millis(self.line_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn clamp_read_buffer(size: usize) -> usize {
    size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE)
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
