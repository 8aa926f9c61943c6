//! Configuration for the capture writer.
//!
//! Loaded from `config/capture` (optional) and environment variables prefixed
//! with `CAPTURE__`, e.g. `CAPTURE__JPEG_QUALITY=80`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration for capture sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Directory holding one sub-directory per capture
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// JPEG quality for color images (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Maximum frames waiting for the writer
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Write a `complete_<NNNNNN>` marker after each fully written frame
    #[serde(default)]
    pub write_completion_marker: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("captures")
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_queue_size() -> usize {
    32
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            jpeg_quality: default_jpeg_quality(),
            queue_size: default_queue_size(),
            write_completion_marker: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Environment variables override the file.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/capture").required(false))
            .add_source(
                Environment::with_prefix("CAPTURE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.output_root.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "output_root".to_string(),
            ));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigValidationError::InvalidValue {
                field: "jpeg_quality".to_string(),
                message: "Quality must be between 1 and 100".to_string(),
            });
        }

        if self.queue_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "queue_size".to_string(),
                message: "Queue size must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
