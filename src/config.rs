//! Configuration for the states language library and the `asl` tool
//!
//! Settings are layered: built-in defaults, then an optional file (any format
//! the `config` crate understands), then `ASL_`-prefixed environment
//! variables such as `ASL_VALIDATION__MAX_BRANCH_DEPTH=8`.

use serde::{Deserialize, Serialize};

use crate::models::intrinsic::DEFAULT_MAX_NESTING_DEPTH;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AslConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub intrinsics: IntrinsicConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or
    /// `states_language=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Validator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Run the terminal-reachability pass after the structural pass
    #[serde(default = "default_true")]
    pub check_reachability: bool,

    /// Deepest allowed nesting of Parallel branches and Map iterators
    #[serde(default = "default_max_branch_depth")]
    pub max_branch_depth: usize,

    /// Nesting limit applied when checking intrinsic expressions in paths
    #[serde(default = "default_max_nesting_depth")]
    pub max_intrinsic_depth: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            check_reachability: true,
            max_branch_depth: default_max_branch_depth(),
            max_intrinsic_depth: default_max_nesting_depth(),
        }
    }
}

/// Intrinsic evaluation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicConfig {
    /// Deepest allowed nesting of function calls inside one expression
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    /// Largest array `States.ArrayRange` may produce
    #[serde(default = "default_max_array_range_items")]
    pub max_array_range_items: usize,
}

impl Default for IntrinsicConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: default_max_nesting_depth(),
            max_array_range_items: default_max_array_range_items(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_branch_depth() -> usize {
    16
}

fn default_max_nesting_depth() -> usize {
    DEFAULT_MAX_NESTING_DEPTH
}

fn default_max_array_range_items() -> usize {
    1000
}

impl AslConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&AslConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // ASL_LOGGING__LEVEL, ASL_INTRINSICS__MAX_NESTING_DEPTH, ...
        builder = builder.add_source(
            config::Environment::with_prefix("ASL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AslConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.validation.check_reachability);
        assert_eq!(config.validation.max_branch_depth, 16);
        assert_eq!(config.intrinsics.max_nesting_depth, 32);
        assert_eq!(config.intrinsics.max_array_range_items, 1000);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AslConfig::load(None).unwrap();
        assert_eq!(config.validation.max_intrinsic_depth, 32);
    }

    #[test]
    fn test_partial_sections_fill_in_defaults() {
        let config: AslConfig =
            serde_json::from_str(r#"{"validation": {"check_reachability": false}}"#).unwrap();
        assert!(!config.validation.check_reachability);
        assert_eq!(config.validation.max_branch_depth, 16);
        assert_eq!(config.intrinsics, IntrinsicConfig::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AslConfig::load(Some("/nonexistent/asl-config.toml")).is_err());
    }
}
