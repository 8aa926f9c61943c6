//! Configuration for the reconstruction loader.
//!
//! Loaded from `config/reconstruct` (optional) and environment variables
//! prefixed with `RECONSTRUCT__`, e.g. `RECONSTRUCT__MAX_SAMPLE_COUNT=60`.

use crate::engine::Detail;
use crate::frame_selector::DEFAULT_MAX_SAMPLE_COUNT;
use config::{Config, ConfigError, Environment, File};
use scan_capture::{ConfigValidationError, LoggingConfig};
use serde::Deserialize;

/// Main configuration for reconstruction runs.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconstructConfig {
    /// Upper bound on frames handed to the engine
    #[serde(default = "default_max_sample_count")]
    pub max_sample_count: usize,

    /// Treat frames without a `complete_<NNNNNN>` marker as unusable
    #[serde(default)]
    pub require_completion_marker: bool,

    /// Sub-directory of the capture that receives output models
    #[serde(default = "default_output_dir_name")]
    pub output_dir_name: String,

    /// Requested model detail (preview, reduced, medium, full, raw)
    #[serde(default = "default_detail")]
    pub detail: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_max_sample_count() -> usize {
    DEFAULT_MAX_SAMPLE_COUNT
}
fn default_output_dir_name() -> String {
    "ReconstructionOutput".to_string()
}
fn default_detail() -> String {
    "reduced".to_string()
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            max_sample_count: default_max_sample_count(),
            require_completion_marker: false,
            output_dir_name: default_output_dir_name(),
            detail: default_detail(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ReconstructConfig {
    /// Load configuration from file and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/reconstruct").required(false))
            .add_source(
                Environment::with_prefix("RECONSTRUCT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_sample_count == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "max_sample_count".to_string(),
                message: "Sample count must be greater than 0".to_string(),
            });
        }

        if self.output_dir_name.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "output_dir_name".to_string(),
            ));
        }
        if self.output_dir_name.contains(['/', '\\']) || self.output_dir_name.starts_with('.') {
            return Err(ConfigValidationError::InvalidValue {
                field: "output_dir_name".to_string(),
                message: "Must be a plain directory name".to_string(),
            });
        }

        if let Err(message) = self.detail.parse::<Detail>() {
            return Err(ConfigValidationError::InvalidValue {
                field: "detail".to_string(),
                message,
            });
        }

        Ok(())
    }
}
