//! Aggregate configuration.
//!
//! Every component keeps its own serde struct with defaults; `ArborConfig`
//! gathers them so a single JSON file can configure the whole runtime:
//!
//! ```json
//! {
//!   "preprocess": { "top_k": 30 },
//!   "mapping":    { "acceptance_threshold": 0.85, "concurrency": 8 },
//!   "tree":       { "max_steps": 6 }
//! }
//! ```
//!
//! Omitted sections and fields take their defaults. `ARBOR_*` environment
//! variables override file values.

use std::path::Path;
use std::str::FromStr;

use arbor_mapping::MappingConfig;
use arbor_reasoning::ReasoningConfig;
use arbor_schema::PreprocessConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::ExecutorConfig;
use crate::orchestrator::TreeConfig;

/// Path of the JSON config file read by [`ArborConfig::from_env`].
pub const CONFIG_PATH_VAR: &str = "ARBOR_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArborConfig {
    pub preprocess: PreprocessConfig,
    pub reasoning: ReasoningConfig,
    pub mapping: MappingConfig,
    pub executor: ExecutorConfig,
    pub tree: TreeConfig,
}

impl ArborConfig {
    /// Load from a JSON file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the file named by `ARBOR_CONFIG` if set, then
    /// `ARBOR_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `ARBOR_*` overrides from `lookup`, then validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&lookup, "ARBOR_TOP_K", &mut self.preprocess.top_k)?;
        override_with(
            &lookup,
            "ARBOR_MAX_TEXT_CARDINALITY",
            &mut self.preprocess.max_text_cardinality,
        )?;
        override_with(
            &lookup,
            "ARBOR_ACCEPTANCE_THRESHOLD",
            &mut self.mapping.acceptance_threshold,
        )?;
        override_with(&lookup, "ARBOR_MAX_COMPARISONS", &mut self.mapping.max_comparisons)?;
        override_with(&lookup, "ARBOR_MAPPING_CONCURRENCY", &mut self.mapping.concurrency)?;
        override_with(&lookup, "ARBOR_REASONING_TIMEOUT_MS", &mut self.reasoning.timeout_ms)?;
        override_with(&lookup, "ARBOR_MAX_STEPS", &mut self.tree.max_steps)?;

        // One store deadline covers preprocessing and query execution.
        let mut store_timeout: Option<u64> = None;
        override_with(&lookup, "ARBOR_STORE_TIMEOUT_MS", &mut store_timeout)?;
        if let Some(ms) = store_timeout {
            self.preprocess.call_timeout_ms = ms;
            self.executor.call_timeout_ms = ms;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.mapping.acceptance_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "mapping.acceptance_threshold must be within [0, 1], got {threshold}"
            )));
        }
        let positive = [
            ("preprocess.top_k", self.preprocess.top_k),
            ("mapping.concurrency", self.mapping.concurrency),
            ("tree.max_steps", self.tree.max_steps),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be at least 1")));
            }
        }
        let timeouts = [
            ("preprocess.call_timeout_ms", self.preprocess.call_timeout_ms),
            ("reasoning.timeout_ms", self.reasoning.timeout_ms),
            ("executor.call_timeout_ms", self.executor.call_timeout_ms),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Parse `key` from `lookup` into `slot` when present.
fn override_with<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: ParseSlot,
{
    if let Some(raw) = lookup(key) {
        slot.parse_into(raw.trim()).ok_or(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        })?;
    }
    Ok(())
}

trait ParseSlot {
    fn parse_into(&mut self, raw: &str) -> Option<()>;
}

macro_rules! parse_slot {
    ($($ty:ty),*) => {
        $(
            impl ParseSlot for $ty {
                fn parse_into(&mut self, raw: &str) -> Option<()> {
                    *self = <$ty>::from_str(raw).ok()?;
                    Some(())
                }
            }

            impl ParseSlot for Option<$ty> {
                fn parse_into(&mut self, raw: &str) -> Option<()> {
                    *self = Some(<$ty>::from_str(raw).ok()?);
                    Some(())
                }
            }
        )*
    };
}

parse_slot!(usize, u64, f32);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ArborConfig::default();
        config.validate().unwrap();
        assert_eq!(config.preprocess.top_k, 30);
        assert_eq!(config.mapping.acceptance_threshold, 0.8);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"mapping": {{"acceptance_threshold": 0.9}}, "tree": {{"max_steps": 3}}}}"#
        )
        .unwrap();
        let config = ArborConfig::load(file.path()).unwrap();
        assert_eq!(config.mapping.acceptance_threshold, 0.9);
        assert_eq!(config.mapping.concurrency, 4);
        assert_eq!(config.tree.max_steps, 3);
        assert_eq!(config.preprocess.top_k, 30);
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            ArborConfig::load("/definitely/not/here.json"),
            Err(ConfigError::Io { .. })
        ));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            ArborConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ArborConfig::default();
        config
            .apply_overrides(env(&[
                ("ARBOR_TOP_K", "10"),
                ("ARBOR_ACCEPTANCE_THRESHOLD", " 0.75 "),
                ("ARBOR_STORE_TIMEOUT_MS", "2500"),
            ]))
            .unwrap();
        assert_eq!(config.preprocess.top_k, 10);
        assert_eq!(config.mapping.acceptance_threshold, 0.75);
        assert_eq!(config.preprocess.call_timeout_ms, 2500);
        assert_eq!(config.executor.call_timeout_ms, 2500);
        assert_eq!(config.tree.max_steps, 8);
    }

    #[test]
    fn test_bad_overrides_rejected() {
        let mut config = ArborConfig::default();
        assert!(matches!(
            config.apply_overrides(env(&[("ARBOR_MAX_STEPS", "many")])),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = ArborConfig::default();
        assert!(matches!(
            config.apply_overrides(env(&[("ARBOR_ACCEPTANCE_THRESHOLD", "1.5")])),
            Err(ConfigError::Invalid(_))
        ));

        let mut config = ArborConfig::default();
        assert!(matches!(
            config.apply_overrides(env(&[("ARBOR_MAPPING_CONCURRENCY", "0")])),
            Err(ConfigError::Invalid(_))
        ));
    }
}
