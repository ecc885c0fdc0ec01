//! Dispatcher and telemetry configuration

use crate::{
    error::{LogchanError, Result},
    event::LogLevel,
    stack::MIN_STACK_DEPTH,
};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Queue capacity used when none is configured
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Name of the consumer thread
pub const DEFAULT_THREAD_NAME: &str = "logchan-consumer";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogchanConfig {
    /// Dispatch pipeline settings
    pub dispatcher: DispatcherConfig,

    /// Diagnostics for the library itself
    pub telemetry: TelemetryConfig,
}

/// Dispatch pipeline settings, fixed once a dispatcher is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Events buffered between producers and the consumer before new ones are dropped
    pub queue_capacity: usize,

    /// Frames kept per captured stack (at least 32)
    pub stack_depth: usize,

    /// Caller frames to skip above the send call
    pub skip_frames: usize,

    /// Consumer thread name
    pub thread_name: String,

    /// Fallback destination for failure reports
    pub sink: SinkConfig,
}

/// Destination for rendered lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// File path template; `{appName}` and `{date}` are expanded. Standard error when unset.
    pub file_format: Option<String>,

    /// Substituted for `{appName}`; required when `file_format` is set
    pub app_name: Option<String>,

    /// Permission bits for created directories and files (unix)
    pub dir_mode: Option<u32>,
}

/// Subscriber settings for the library's own `tracing` output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Install a subscriber at all
    pub enabled: bool,

    pub level: LogLevel,

    pub format: LogFormat,

    /// Include source location in logs
    pub include_location: bool,

    /// Include thread names/IDs
    pub include_thread_info: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON format
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stack_depth: MIN_STACK_DEPTH,
            skip_frames: 0,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            sink: SinkConfig::default(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            format: LogFormat::Compact,
            include_location: false,
            include_thread_info: false,
        }
    }
}

impl DispatcherConfig {
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(LogchanError::Config {
                message: "queue_capacity must be greater than 0".to_string(),
            });
        }

        if self.stack_depth < MIN_STACK_DEPTH {
            return Err(LogchanError::Config {
                message: format!("stack_depth must be at least {}", MIN_STACK_DEPTH),
            });
        }

        if self.thread_name.is_empty() {
            return Err(LogchanError::Config {
                message: "thread_name must not be empty".to_string(),
            });
        }

        self.sink.validate()
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<()> {
        let has_file = self.file_format.as_deref().is_some_and(|f| !f.is_empty());
        let has_app = self.app_name.as_deref().is_some_and(|a| !a.is_empty());

        if has_file && !has_app {
            return Err(LogchanError::Config {
                message: "app_name is required when file_format is set".to_string(),
            });
        }

        Ok(())
    }
}

impl LogchanConfig {
    /// Load configuration from file or create default, then apply environment overrides
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if config_file.exists() {
            let content = tokio::fs::read_to_string(&config_file).await?;
            toml::from_str(&content).map_err(|e| LogchanError::Config {
                message: format!("Failed to parse logchan config: {}", e),
            })?
        } else {
            Self::default()
        };

        config.load_env_overrides();
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config_path: Option<&Path>) -> Result<()> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| LogchanError::Config {
            message: format!("Failed to serialize logchan config: {}", e),
        })?;

        tokio::fs::write(&config_file, content).await?;
        Ok(())
    }

    /// Load environment variable overrides
    pub fn load_env_overrides(&mut self) {
        if let Ok(capacity) = std::env::var("LOGCHAN_QUEUE_CAPACITY") {
            self.dispatcher.queue_capacity =
                capacity.parse().unwrap_or(self.dispatcher.queue_capacity);
        }

        if let Ok(depth) = std::env::var("LOGCHAN_STACK_DEPTH") {
            self.dispatcher.stack_depth = depth.parse().unwrap_or(self.dispatcher.stack_depth);
        }

        if let Ok(skip) = std::env::var("LOGCHAN_SKIP_FRAMES") {
            self.dispatcher.skip_frames = skip.parse().unwrap_or(self.dispatcher.skip_frames);
        }

        if let Ok(app_name) = std::env::var("LOGCHAN_APP_NAME") {
            self.dispatcher.sink.app_name = Some(app_name);
        }

        if let Ok(file_format) = std::env::var("LOGCHAN_FILE_FORMAT") {
            self.dispatcher.sink.file_format = Some(file_format);
        }

        if let Ok(level) = std::env::var("LOGCHAN_LOG_LEVEL") {
            self.telemetry.level = level.parse().unwrap_or(self.telemetry.level);
        }

        if let Ok(format) = std::env::var("LOGCHAN_LOG_FORMAT") {
            self.telemetry.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                "compact" => LogFormat::Compact,
                _ => self.telemetry.format,
            };
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.dispatcher.validate()
    }

    /// Get default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("com", "logchan", "logchan").ok_or_else(|| LogchanError::Config {
                message: "Could not determine config directory".to_string(),
            })?;

        Ok(project_dirs.config_dir().join("logchan.toml"))
    }
}
