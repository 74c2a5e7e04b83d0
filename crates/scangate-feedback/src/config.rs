use scangate_core::GateThresholds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Session configuration: loop timing, analysis resolution and gating thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Width of the downscaled analysis buffer.
    pub analysis_width: u32,
    /// Height of the downscaled analysis buffer.
    pub analysis_height: u32,
    /// Quiet period before a changed decision is rendered.
    pub debounce_ms: u64,
    /// Delay between the starts of two cycles.
    pub frame_interval_ms: u64,
    pub thresholds: GateThresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis_width: 160,
            analysis_height: 120,
            debounce_ms: 100,
            frame_interval_ms: 33,
            thresholds: GateThresholds::default(),
        }
    }
}

impl Config {
    /// Defaults with `SCANGATE_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides().validated()
    }

    /// Load a TOML file, then apply `SCANGATE_*` environment overrides.
    /// Keys missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?.with_env_overrides().validated()?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validated()
    }

    /// Reject values the loop cannot run with.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.analysis_width == 0 || self.analysis_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "analysis resolution must be non-zero, got {}x{}",
                self.analysis_width, self.analysis_height
            )));
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "frame_interval_ms must be at least 1".into(),
            ));
        }
        Ok(self)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn with_env_overrides(self) -> Self {
        Self {
            analysis_width: env_u32("SCANGATE_ANALYSIS_WIDTH", self.analysis_width),
            analysis_height: env_u32("SCANGATE_ANALYSIS_HEIGHT", self.analysis_height),
            debounce_ms: env_u64("SCANGATE_DEBOUNCE_MS", self.debounce_ms),
            frame_interval_ms: env_u64("SCANGATE_FRAME_INTERVAL_MS", self.frame_interval_ms),
            thresholds: self.thresholds,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Never shorter than 1 ms; a zero period would stall the ticker.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!((config.analysis_width, config.analysis_height), (160, 120));
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert_eq!(config.thresholds.sharpness.min_resolution, 200);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            debounce_ms = 250

            [thresholds.lighting]
            too_bright_mean = 230.0
            "#,
        )
        .unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.frame_interval_ms, 33);
        assert_eq!(config.thresholds.lighting.too_bright_mean, 230.0);
        assert_eq!(config.thresholds.lighting.too_dark_mean, 50.0);
        assert_eq!(config.thresholds.face.max_tilt_degrees, 15.0);
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = Config::default().to_toml().unwrap();
        assert!(text.contains("debounce_ms = 100"));
        assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("debounce_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "analysis_width = 320\nanalysis_height = 240").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.analysis_width, 320);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/scangate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_zero_frame_interval_rejected() {
        let err = Config::from_toml("frame_interval_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_analysis_resolution_rejected() {
        let err = Config::from_toml("analysis_width = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = Config::from_toml("analysis_height = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validated_checks_env_overridden_values() {
        let config = Config {
            frame_interval_ms: 0,
            ..Config::default()
        };
        assert!(matches!(config.validated(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_frame_interval_never_zero() {
        let config = Config {
            frame_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_env_helper_parses_and_falls_back() {
        std::env::set_var("SCANGATE_TEST_ENV_HELPER", "42");
        assert_eq!(env_u64("SCANGATE_TEST_ENV_HELPER", 7), 42);
        std::env::set_var("SCANGATE_TEST_ENV_HELPER", "not-a-number");
        assert_eq!(env_u64("SCANGATE_TEST_ENV_HELPER", 7), 7);
        assert_eq!(env_u32("SCANGATE_TEST_ENV_UNSET", 9), 9);
    }
}
