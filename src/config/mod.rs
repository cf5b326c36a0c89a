//! Configuration management
//!
//! Engine settings live in a TOML file with one table per pipeline stage.
//! Every table is optional; missing values fall back to the fixed policy in
//! [`policy`].

pub mod policy;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::CaptureConfig;
use crate::error::ConfigError;
use crate::vision::VisionConfig;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Segmentation pipeline
    pub vision: VisionConfig,
    /// Live capture worker
    pub capture: CaptureConfig,
}

/// Per-stage image dumps for debugging the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Write stage images on every run
    pub enabled: bool,
    /// Directory receiving the images
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.vision;

        if v.detector.threshold_step == 0 {
            return Err(ConfigError::invalid("vision.detector.threshold_step", "must be at least 1"));
        }
        if v.detector.stable_levels == 0 {
            return Err(ConfigError::invalid("vision.detector.stable_levels", "must be at least 1"));
        }
        if !(v.detector.max_area_ratio > 0.0 && v.detector.max_area_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "vision.detector.max_area_ratio",
                format!("{} is outside (0, 1]", v.detector.max_area_ratio),
            ));
        }
        if v.detector.min_glyph_width < 1 || v.detector.min_glyph_height < 1 {
            return Err(ConfigError::invalid("vision.detector.min_glyph_width", "glyph minimums must be positive"));
        }
        if !(v.histogram.consider_ratio > 0.0 && v.histogram.consider_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "vision.histogram.consider_ratio",
                format!("{} is outside (0, 1]", v.histogram.consider_ratio),
            ));
        }
        if v.seeding.min_gap < 1 {
            return Err(ConfigError::invalid("vision.seeding.min_gap", "must be at least 1"));
        }
        if v.seeding.max_gap_ratio <= 0.0 {
            return Err(ConfigError::invalid("vision.seeding.max_gap_ratio", "must be positive"));
        }
        if v.seeding.vertical_slack_divisor < 1 {
            return Err(ConfigError::invalid("vision.seeding.vertical_slack_divisor", "must be at least 1"));
        }
        if v.seeding.min_line_chars == 0 {
            return Err(ConfigError::invalid("vision.seeding.min_line_chars", "must be at least 1"));
        }
        if v.refiner.min_opening_width < policy::MIN_OPENING_WIDTH {
            return Err(ConfigError::invalid(
                "vision.refiner.min_opening_width",
                format!("opening is undefined below {} columns", policy::MIN_OPENING_WIDTH),
            ));
        }
        if v.refiner.min_char_height < 1 {
            return Err(ConfigError::invalid("vision.refiner.min_char_height", "must be at least 1"));
        }
        if v.growth.probe_width_ratio <= 0.0 || v.growth.max_bridge_ratio <= 0.0 {
            return Err(ConfigError::invalid("vision.growth.probe_width_ratio", "growth ratios must be positive"));
        }
        if v.growth.min_estimate_divisor < 1 {
            return Err(ConfigError::invalid("vision.growth.min_estimate_divisor", "must be at least 1"));
        }
        if v.growth.vertical_pad < 0 || v.growth.char_margin < 0 {
            return Err(ConfigError::invalid("vision.growth.vertical_pad", "padding cannot be negative"));
        }
        if v.diagnostics.enabled && v.diagnostics.output_dir.is_none() {
            return Err(ConfigError::invalid("vision.diagnostics.output_dir", "required when diagnostics are enabled"));
        }
        if self.capture.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("capture.poll_interval_ms", "must be at least 1"));
        }
        Ok(())
    }
}

/// Load and validate configuration from file
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: EngineConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &EngineConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write config {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{GrowthConfig, Polarity};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_engine_config() {
        let config = EngineConfig::default();

        assert_eq!(config.vision.detector.min_glyph_width, 8);
        assert_eq!(config.vision.detector.min_glyph_height, 8);
        assert_eq!(config.vision.detector.polarity, Polarity::DarkOnLight);
        assert!((config.vision.histogram.consider_ratio - 0.618).abs() < f32::EPSILON);
        assert_eq!(config.vision.seeding.min_line_chars, 3);
        assert_eq!(config.vision.refiner.min_opening_width, 2);
        assert_eq!(config.vision.refiner.min_char_height, 4);
        assert!(!config.vision.diagnostics.enabled);
        assert!(!config.capture.keep_previous_on_empty);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = EngineConfig::default();
        config.vision.detector.polarity = Polarity::Both;
        config.vision.diagnostics = DiagnosticsConfig {
            enabled: true,
            output_dir: Some(PathBuf::from("/tmp/glyphline")),
        };
        config.capture.publish_visualization = true;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [vision.seeding]
            min_line_chars = 4

            [capture]
            poll_interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(parsed.vision.seeding.min_line_chars, 4);
        assert_eq!(parsed.vision.seeding.min_gap, policy::MIN_CHAR_GAP);
        assert_eq!(parsed.capture.poll_interval_ms, 50);
        assert_eq!(parsed.vision.growth, GrowthConfig::default());
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = EngineConfig::default();
        config.vision.histogram.consider_ratio = 0.5;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[vision.refiner]\nmin_opening_width = 1").unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(
            config_err,
            ConfigError::Invalid { field: "vision.refiner.min_opening_width", .. }
        ));
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        let mut config = EngineConfig::default();
        config.vision.histogram.consider_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.vision.diagnostics.enabled = true;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.capture.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
