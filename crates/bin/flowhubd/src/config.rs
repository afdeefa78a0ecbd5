//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `flowhub.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tick loop and graph settings.
    pub engine: EngineConfig,
    /// Command log and attribution settings.
    pub correlator: CorrelatorConfig,
    /// Notification rate limits.
    pub notifications: NotificationsConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Integration toggles.
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    /// Ticks during which new nodes may not emit device commands.
    pub warmup_ticks: u64,
    /// JSON graph document loaded at startup.
    pub graph_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    pub log_path: PathBuf,
    /// Size at which the log is rotated to `<log_path>.old`.
    pub max_log_bytes: u64,
    pub window_ms: u64,
    /// Records kept in memory for history queries.
    pub history_capacity: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub global_interval_ms: u64,
    pub per_device_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Per-integration toggles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Enable the virtual/demo integration.
    pub virtual_enabled: bool,
}

impl Config {
    /// Load configuration from `flowhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting values are invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("flowhub.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("FLOWHUB_TICK_MS") {
            match val.parse() {
                Ok(ms) => self.engine.tick_interval_ms = ms,
                Err(_) => tracing::warn!(value = %val, "ignoring unparsable FLOWHUB_TICK_MS"),
            }
        }
        if let Some(val) = var("FLOWHUB_GRAPH") {
            self.engine.graph_path = PathBuf::from(val);
        }
        if let Some(val) = var("FLOWHUB_COMMAND_LOG") {
            self.correlator.log_path = PathBuf::from(val);
        }
        if let Some(val) = var("FLOWHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "tick_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.engine.warmup_ticks == 0 {
            return Err(ConfigError::Validation(
                "warmup_ticks must be at least 1".to_string(),
            ));
        }
        if self.correlator.history_capacity == 0 {
            return Err(ConfigError::Validation(
                "history_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.engine.tick_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            warmup_ticks: flowhub_app::scheduler::DEFAULT_WARMUP_TICKS,
            graph_path: PathBuf::from("graph.json"),
        }
    }
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("command_log.jsonl"),
            max_log_bytes: flowhub_adapter_jsonl_log::DEFAULT_MAX_BYTES,
            window_ms: flowhub_domain::record::CORRELATION_WINDOW_MS,
            history_capacity: flowhub_app::correlator::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_interval_ms: flowhub_app::notifier::DEFAULT_GLOBAL_INTERVAL_MS,
            per_device_interval_ms: flowhub_app::notifier::DEFAULT_PER_DEVICE_INTERVAL_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "flowhubd=info,flowhub=info".to_string(),
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            virtual_enabled: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
