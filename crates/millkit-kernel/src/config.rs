//! Engine configuration.
//!
//! ```toml
//! [engine]
//! benchmark_enabled = true
//! slow_call_warn_ms = 250.0
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SLOW_CALL_WARN_MS: f64 = 1_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Whether the ungated benchmark entry point answers at all.
    pub benchmark_enabled: bool,
    /// Calls slower than this are logged at `warn`.
    pub slow_call_warn_ms: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            benchmark_enabled: true,
            slow_call_warn_ms: DEFAULT_SLOW_CALL_WARN_MS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineConfig,
}

impl EngineConfig {
    /// Parse the `[engine]` table of a TOML document. Missing keys keep defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        let config = file.engine;
        if !(config.slow_call_warn_ms.is_finite() && config.slow_call_warn_ms >= 0.0) {
            return Err(ConfigError::Value(format!(
                "slow_call_warn_ms must be a non-negative number, got {}",
                config.slow_call_warn_ms
            )));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_defaults() {
        assert_eq!(
            EngineConfig::from_toml_str("").unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn engine_table_overrides() {
        let config = EngineConfig::from_toml_str(
            "[engine]\nbenchmark_enabled = false\nslow_call_warn_ms = 50.0\n",
        )
        .unwrap();
        assert!(!config.benchmark_enabled);
        assert_eq!(config.slow_call_warn_ms, 50.0);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = EngineConfig::load("/nonexistent/millkit.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/millkit.toml"));
    }

    #[test]
    fn unknown_keys_and_bad_values_are_rejected() {
        assert!(EngineConfig::from_toml_str("[engine]\nturbo = true\n").is_err());
        assert!(matches!(
            EngineConfig::from_toml_str("[engine]\nslow_call_warn_ms = -1.0\n"),
            Err(ConfigError::Value(_))
        ));
    }
}
