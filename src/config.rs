//! Reasoner configuration, persisted as TOML.
//!
//! Every field has a serde default so partial files are accepted:
//!
//! ```toml
//! cache_capacity = 1000
//! parallel_candidates = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, MatchResult};

/// Configuration for the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonerConfig {
    /// Capacity of each bounded cache (distance, match and declaration caches).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Recursion bound for hierarchy walks (asserted distance, core chains,
    /// inherited relations).
    #[serde(default = "default_max_hierarchy_depth")]
    pub max_hierarchy_depth: usize,
    /// Evaluate strategy substitution candidates on the rayon pool.
    #[serde(default = "default_parallel_candidates")]
    pub parallel_candidates: bool,
    /// Maximum concrete substitutions considered per abstract predicate.
    #[serde(default = "default_max_substitutions")]
    pub max_substitutions: usize,
}

fn default_cache_capacity() -> usize {
    400
}
fn default_max_hierarchy_depth() -> usize {
    256
}
fn default_parallel_candidates() -> bool {
    true
}
fn default_max_substitutions() -> usize {
    64
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            max_hierarchy_depth: default_max_hierarchy_depth(),
            parallel_candidates: default_parallel_candidates(),
            max_substitutions: default_max_substitutions(),
        }
    }
}

impl ReasonerConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> MatchResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> MatchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> MatchResult<()> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "cache_capacity must be > 0".into(),
            }
            .into());
        }
        if self.max_hierarchy_depth == 0 {
            return Err(ConfigError::Invalid {
                message: "max_hierarchy_depth must be > 0".into(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MatchError;

    #[test]
    fn defaults_match_documented_values() {
        let config = ReasonerConfig::default();
        assert_eq!(config.cache_capacity, 400);
        assert_eq!(config.max_hierarchy_depth, 256);
        assert!(config.parallel_candidates);
        assert_eq!(config.max_substitutions, 64);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = ReasonerConfig::from_toml_str("cache_capacity = 10\n").unwrap();
        assert_eq!(config.cache_capacity, 10);
        assert_eq!(config.max_hierarchy_depth, 256);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = ReasonerConfig::from_toml_str("cache_capacity = 0\n").unwrap_err();
        assert!(matches!(err, MatchError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = ReasonerConfig::from_toml_str("cache_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, MatchError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reasoner.toml");
        std::fs::write(&path, "parallel_candidates = false\nmax_substitutions = 3\n").unwrap();
        let config = ReasonerConfig::load(&path).unwrap();
        assert!(!config.parallel_candidates);
        assert_eq!(config.max_substitutions, 3);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ReasonerConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, MatchError::Config(ConfigError::Read { .. })));
    }
}
