//! Alignment configuration using Figment
//!
//! Configuration is layered:
//! 1. Built-in defaults (every section is optional)
//! 2. `config/align.toml` (or any file passed to [`AlignConfig::load_from`])
//! 3. Environment variables prefixed with `DAQ_ALIGN_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use daq_align::config::AlignConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AlignConfig::load()?;
//! config.validate()?;
//! println!("Aligning with feature {}", config.alignment.feature);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::collector::CollectorConfig;
use crate::analysis::peak::PeakCriteria;
use crate::error::ConfigError;
use crate::experiment::align::{AlignmentConfig, Feature};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/align.toml";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "DAQ_ALIGN_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Document-stream collector settings
    pub collector: CollectorConfig,
    /// Peak classifier thresholds
    pub peak: PeakCriteria,
    /// Alignment loop defaults
    pub alignment: AlignmentConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "daq-align".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl AlignConfig {
    /// Load configuration from `config/align.toml` and environment variables
    ///
    /// Example override: `DAQ_ALIGN_ALIGNMENT__NSCANS=3`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(Figment::from(Serialized::defaults(AlignConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        if !LOG_FORMATS.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                LOG_FORMATS.join(", ")
            )));
        }

        if self.collector.stream_name.is_empty() {
            return Err(ConfigError::Validation(
                "collector.stream_name must not be empty".to_string(),
            ));
        }

        let peak = &self.peak;
        for (name, value) in [
            ("strong_peak_ratio", peak.strong_peak_ratio),
            ("fallback_ratio", peak.fallback_ratio),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::Validation(format!(
                    "peak.{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if !(peak.too_wide_fraction > 0.0 && peak.too_wide_fraction <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "peak.too_wide_fraction must be in (0, 1], got {}",
                peak.too_wide_fraction
            )));
        }

        if self.alignment.nscans == 0 {
            return Err(ConfigError::Validation(
                "alignment.nscans must be at least 1".to_string(),
            ));
        }
        self.alignment
            .feature
            .parse::<Feature>()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_missing_file_yields_defaults() {
        let config = AlignConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config, AlignConfig::default());
        assert_eq!(config.collector.stream_name, "primary");
        assert!(config.collector.auto_report);
        assert_eq!(config.alignment.nscans, 2);
        assert_eq!(config.alignment.feature, "centroid");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_partial_file_overrides_defaults() {
        let file = write_config(
            r#"
[application]
log_level = "debug"

[alignment]
feature = "cen"

[peak]
too_wide_fraction = 0.8
"#,
        );
        let config = AlignConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.name, "daq-align");
        assert_eq!(config.alignment.feature, "cen");
        assert_eq!(config.alignment.nscans, 2);
        assert_eq!(config.peak.too_wide_fraction, 0.8);
        assert_eq!(config.peak.strong_peak_ratio, 2.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config("[alignment]\nnscans = 5\n");
        std::env::set_var("DAQ_ALIGN_ALIGNMENT__NSCANS", "3");
        let result = AlignConfig::load_from(file.path());
        std::env::remove_var("DAQ_ALIGN_ALIGNMENT__NSCANS");

        assert_eq!(result.unwrap().alignment.nscans, 3);
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_load_error() {
        let file = write_config("[alignment]\nnscans = \"many\"\n");
        let err = AlignConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AlignConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = AlignConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = AlignConfig::default();
        config.alignment.feature = "peak".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("peak"));

        let mut config = AlignConfig::default();
        config.alignment.nscans = 0;
        assert!(config.validate().is_err());

        let mut config = AlignConfig::default();
        config.peak.too_wide_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = AlignConfig::default();
        config.peak.strong_peak_ratio = f64::NAN;
        assert!(config.validate().is_err());
    }
}
