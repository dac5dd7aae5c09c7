use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use regex::Regex;
use thiserror::Error;

use crate::adapters::registry::BACKENDS;
use crate::domain::models::config::Config;
use crate::infrastructure::logging::{parse_log_level, LogFormat, RotationPolicy};

/// Project-local directory holding config files
pub const CONFIG_DIR: &str = ".mender";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid confidence_threshold: {0}. Must be between 0.0 and 1.0")]
    InvalidConfidenceThreshold(f64),

    #[error("Invalid convergence.passes: {0}. Must be at least 1")]
    InvalidPasses(u32),

    #[error("Invalid convergence.majority_ratio: {0}. Must be greater than 0.0 and at most 1.0")]
    InvalidMajorityRatio(f64),

    #[error("Invalid verifier.max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    #[error("Invalid signals.overlap_threshold: {0}. Must be greater than 0.0 and at most 1.0")]
    InvalidOverlapThreshold(f64),

    #[error("Unknown generator backend: {0}. Must be one of: template, local_model, remote_advisor")]
    UnknownBackend(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Build program cannot be empty")]
    EmptyBuildProgram,

    #[error("State directory cannot be empty")]
    EmptyStateDir,

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the repository at `root`
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. <root>/.mender/config.yaml (project config)
    /// 3. <root>/.mender/local.yaml (untracked local overrides, optional)
    /// 4. Environment variables (MENDER_* prefix, `__` separates nested keys)
    pub fn load(root: &Path) -> Result<Config> {
        let dir = root.join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("MENDER_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, ignoring project files and environment
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&config.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                config.confidence_threshold,
            ));
        }

        if config.state_dir.trim().is_empty() {
            return Err(ConfigError::EmptyStateDir);
        }

        if config.convergence.passes == 0 {
            return Err(ConfigError::InvalidPasses(config.convergence.passes));
        }

        let ratio = config.convergence.majority_ratio;
        if ratio <= 0.0 || ratio > 1.0 {
            return Err(ConfigError::InvalidMajorityRatio(ratio));
        }

        if config.max_iterations == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        if config.backlog.min_token_matches == 0 {
            return Err(ConfigError::ValidationFailed(
                "backlog.min_token_matches must be at least 1".to_string(),
            ));
        }

        if config.verifier.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.verifier.max_attempts));
        }

        let overlap = config.signals.overlap_threshold;
        if overlap <= 0.0 || overlap > 1.0 {
            return Err(ConfigError::InvalidOverlapThreshold(overlap));
        }

        for name in &config.generators.order {
            if !BACKENDS.contains(&name.as_str()) {
                return Err(ConfigError::UnknownBackend(name.clone()));
            }
        }

        if let Some(refiner) = &config.verifier.refiner {
            if refiner != "local_model" && refiner != "remote_advisor" {
                return Err(ConfigError::ValidationFailed(format!(
                    "verifier.refiner must name a model backend, got '{refiner}'"
                )));
            }
        }

        if config.build.program.trim().is_empty() {
            return Err(ConfigError::EmptyBuildProgram);
        }

        if let Some(local) = &config.generators.local_model {
            if local.program.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "generators.local_model.program cannot be empty".to_string(),
                ));
            }
        }

        if let Some(remote) = &config.generators.remote_advisor {
            if remote.endpoint.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "generators.remote_advisor.endpoint cannot be empty".to_string(),
                ));
            }
        }

        check_pattern(&config.signals.diagnostic_pattern)?;
        for symbol in &config.signals.symbol_patterns {
            let regex = check_pattern(&symbol.pattern)?;
            if regex.captures_len() < 2 {
                return Err(ConfigError::InvalidPattern {
                    pattern: symbol.pattern.clone(),
                    message: "symbol patterns need a capture group for the name".to_string(),
                });
            }
        }

        if parse_log_level(&config.logging.level).is_err() {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if LogFormat::parse(&config.logging.format).is_none() {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if RotationPolicy::parse(&config.logging.rotation).is_none() {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

fn check_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{SelfCheckMode, SymbolPattern};
    use tempfile::TempDir;

    fn write_project_config(root: &Path, file: &str, yaml: &str) {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), yaml).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!((config.confidence_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.convergence.passes, 5);
        assert_eq!(config.verifier.max_attempts, 3);
        assert_eq!(config.max_reuse, 20);
        assert_eq!(config.state_dir, ".mender");
        assert_eq!(config.logging.level, "info");
        assert!(!config.auto_apply);
        assert_eq!(config.max_iterations, 50);
        assert!(config.backlog.skip_present);
        assert_eq!(config.backlog.min_token_matches, 3);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
confidence_threshold: 0.9
auto_apply: true
convergence:
  passes: 3
verifier:
  max_attempts: 2
  self_check: model
generators:
  order: [template, remote_advisor]
  remote_advisor:
    endpoint: https://advisor.example/v1/chat
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert!((config.confidence_threshold - 0.9).abs() < f64::EPSILON);
        assert!(config.auto_apply);
        assert_eq!(config.convergence.passes, 3);
        assert!((config.convergence.majority_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.verifier.max_attempts, 2);
        assert_eq!(config.verifier.self_check, SelfCheckMode::Model);
        assert_eq!(config.generators.order, vec!["template", "remote_advisor"]);
        let remote = config.generators.remote_advisor.as_ref().unwrap();
        assert_eq!(remote.api_key_env, "MENDER_ADVISOR_API_KEY");
        assert_eq!(remote.timeout_secs, 120);
        assert_eq!(config.logging.format, "json");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_load_merges_project_and_local_files() {
        let tmp = TempDir::new().unwrap();
        write_project_config(tmp.path(), "config.yaml", "max_reuse: 5\nconvergence:\n  passes: 7\n");
        write_project_config(tmp.path(), "local.yaml", "convergence:\n  passes: 2\n");

        let config = temp_env::with_vars_unset(["MENDER_CONVERGENCE__PASSES", "MENDER_MAX_REUSE"], || {
            ConfigLoader::load(tmp.path())
        })
        .unwrap();
        assert_eq!(config.max_reuse, 5);
        assert_eq!(config.convergence.passes, 2);
    }

    #[test]
    fn test_env_overrides_files() {
        let tmp = TempDir::new().unwrap();
        write_project_config(tmp.path(), "config.yaml", "confidence_threshold: 0.9\n");

        let config = temp_env::with_vars(
            [
                ("MENDER_CONFIDENCE_THRESHOLD", Some("0.6")),
                ("MENDER_CONVERGENCE__PASSES", Some("4")),
            ],
            || ConfigLoader::load(tmp.path()),
        )
        .unwrap();
        assert!((config.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.convergence.passes, 4);
    }

    #[test]
    fn test_load_rejects_invalid_env_value() {
        let tmp = TempDir::new().unwrap();
        let result = temp_env::with_var("MENDER_CONFIDENCE_THRESHOLD", Some("1.5"), || {
            ConfigLoader::load(tmp.path())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.yaml");
        std::fs::write(&path, "dry_run: true\nbuild:\n  program: make\n  args: [check]\n").unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.build.program, "make");
        assert_eq!(config.build.args, vec!["check"]);
    }

    #[test]
    fn test_validate_threshold_range() {
        let mut config = Config::default();
        config.confidence_threshold = 1.2;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidConfidenceThreshold(_)
        ));

        config.confidence_threshold = 0.0;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_passes() {
        let mut config = Config::default();
        config.convergence.passes = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPasses(0)
        ));
    }

    #[test]
    fn test_validate_majority_ratio() {
        let mut config = Config::default();
        config.convergence.majority_ratio = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMajorityRatio(_)
        ));
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut config = Config::default();
        config.verifier.max_attempts = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxAttempts(0)
        ));
    }

    #[test]
    fn test_validate_loop_and_presence_bounds() {
        let mut config = Config::default();
        config.max_iterations = 0;
        assert!(ConfigLoader::validate(&config).unwrap_err().to_string().contains("max_iterations"));

        let mut config = Config::default();
        config.backlog.min_token_matches = 0;
        assert!(ConfigLoader::validate(&config).unwrap_err().to_string().contains("min_token_matches"));
    }

    #[test]
    fn test_validate_unknown_backend() {
        let mut config = Config::default();
        config.generators.order.push("oracle".to_string());
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::UnknownBackend(name) => assert_eq!(name, "oracle"),
            other => panic!("Expected UnknownBackend, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_refiner_must_be_model() {
        let mut config = Config::default();
        config.verifier.refiner = Some("template".to_string());
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ValidationFailed(_)
        ));
    }

    #[test]
    fn test_validate_bad_patterns() {
        let mut config = Config::default();
        config.signals.diagnostic_pattern = "(unclosed".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPattern { .. }
        ));

        let mut config = Config::default();
        config.signals.symbol_patterns = vec![SymbolPattern {
            pattern: "no capture here".to_string(),
            signature: "x {name}".to_string(),
        }];
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_validate_empty_build_program() {
        let mut config = Config::default();
        config.build.program = "  ".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyBuildProgram
        ));
    }

    #[test]
    fn test_validate_logging() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            _ => panic!("Expected InvalidLogLevel error"),
        }

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRotation(_)
        ));
    }
}
