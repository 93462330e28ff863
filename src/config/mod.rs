pub mod flush_strategy;
pub mod ignore_rule;
pub mod log_level;

use std::path::Path;

use figment::providers::{Format, Yaml};
use figment::{Figment, providers::Env};
use serde::{Deserialize, Deserializer};
use serde_aux::field_attributes::deserialize_bool_from_anything;
use serde_json::Value;

pub use flush_strategy::{FlushStrategy, PeriodicStrategy};
pub use ignore_rule::IgnoreRule;
pub use log_level::LogLevel;

use crate::config::{ignore_rule::deserialize_ignore_rules, log_level::deserialize_log_level};

pub const CONFIG_FILE_NAME: &str = "metronome.yaml";
pub const DEFAULT_ENDPOINT: &str = "https://v4.metrics.metronome.sh";
pub const PROCESS_PATH: &str = "/v4/process";
pub const PRODUCTION_ENVIRONMENT: &str = "production";

#[derive(Debug, PartialEq, Deserialize, Clone)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub endpoint: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub api_key: Option<String>,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub debug: bool,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub suppress_warnings: bool,
    /// Only `production` traffic is instrumented unless `bypass` is set.
    pub environment: String,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub bypass: bool,
    // Filtering
    #[serde(deserialize_with = "deserialize_ignore_rules")]
    pub ignored_routes: Vec<IgnoreRule>,
    #[serde(deserialize_with = "deserialize_ignore_rules")]
    pub ignored_pathnames: Vec<IgnoreRule>,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub ignore_head_method: bool,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub require_api_key: bool,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    // Export
    pub flush_strategy: FlushStrategy,
    /// Flush timeout in seconds
    pub flush_timeout: u64,
    pub flush_retry_count: usize,
    pub batch_size: usize,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub use_compression: bool,
    pub compression_level: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: None,
            api_key: None,
            debug: false,
            suppress_warnings: false,
            environment: "development".to_string(),
            bypass: false,
            // Filtering
            ignored_routes: Vec::new(),
            ignored_pathnames: Vec::new(),
            ignore_head_method: true,
            require_api_key: false,
            log_level: LogLevel::default(),
            // Export
            flush_strategy: FlushStrategy::Default,
            flush_timeout: 5,
            flush_retry_count: 3,
            batch_size: 100,
            use_compression: false,
            compression_level: 3,
        }
    }
}

impl Config {
    /// Full ingestion URL, `<endpoint>/v4/process`.
    #[must_use]
    pub fn get_endpoint(&self) -> String {
        let base = self
            .endpoint
            .as_deref()
            .map_or(DEFAULT_ENDPOINT, |endpoint| endpoint.trim_end_matches('/'));
        format!("{base}{PROCESS_PATH}")
    }

    /// Level the logging subsystem is installed with. `debug` dumps every
    /// exported batch at `info`, so it raises the level to at least that.
    #[must_use]
    pub fn effective_log_level(&self) -> LogLevel {
        if self.debug {
            self.log_level.max(LogLevel::Info)
        } else {
            self.log_level
        }
    }

    /// Environment/bypass gate: `false` means the request must not be instrumented.
    #[must_use]
    pub fn is_instrumentation_enabled(&self) -> bool {
        self.bypass || self.environment == PRODUCTION_ENVIRONMENT
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("failed to parse metronome config: {0}")]
    ParseError(String),
    #[error("an api key is required but METRONOME_API_KEY is not set")]
    MissingApiKey,
}

/// Loads the configuration from `metronome.yaml` in `config_directory`,
/// overridden field by field by `METRONOME_*` environment variables.
#[allow(clippy::module_name_repetitions)]
pub fn get_config(config_directory: &Path) -> Result<Config, ConfigError> {
    let path = config_directory.join(CONFIG_FILE_NAME);

    let figment = Figment::new()
        .merge(Yaml::file(&path))
        // Older deployments set the endpoint through METRONOME_URL
        .merge(
            Env::raw()
                .only(&["METRONOME_URL"])
                .map(|_| "endpoint".into()),
        )
        .merge(Env::prefixed("METRONOME_"));

    figment.extract().map_err(|err| {
        tracing::error!("Failed to parse metronome config: {err}");
        ConfigError::ParseError(err.to_string())
    })
}

/// Recovers from a [`get_config`] failure: the error is logged and the
/// defaults are used, so a malformed configuration never stops the process.
#[must_use]
pub fn config_or_default(loaded: Result<Config, ConfigError>) -> Config {
    loaded.unwrap_or_else(|err| {
        tracing::error!("Using default configuration: {err}");
        Config::default()
    })
}

fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(s.trim().to_string()))
            }
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Null => Ok(None),
        _ => Err(serde::de::Error::custom("expected a string")),
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_parse_default() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(config, Config::default());
            assert!(config.ignore_head_method);
            Ok(())
        });
    }

    #[test]
    fn test_default_endpoint() {
        let config = Config::default();
        assert_eq!(
            config.get_endpoint(),
            "https://v4.metrics.metronome.sh/v4/process"
        );
    }

    #[test]
    fn test_endpoint_override() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("METRONOME_ENDPOINT", "http://localhost:3000/");
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(config.get_endpoint(), "http://localhost:3000/v4/process");
            Ok(())
        });
    }

    #[test]
    fn test_legacy_url_variable() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("METRONOME_URL", "https://collector.example.com");
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(
                config.endpoint.as_deref(),
                Some("https://collector.example.com")
            );
            Ok(())
        });
    }

    #[test]
    fn test_parse_env_flags() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("METRONOME_API_KEY", "secret");
            jail.set_env("METRONOME_DEBUG", "1");
            jail.set_env("METRONOME_SUPPRESS_WARNINGS", "true");
            jail.set_env("METRONOME_BYPASS", "true");
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(config.api_key.as_deref(), Some("secret"));
            assert!(config.debug);
            assert!(config.suppress_warnings);
            assert!(config.is_instrumentation_enabled());
            Ok(())
        });
    }

    #[test]
    fn test_empty_api_key_is_absent() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("METRONOME_API_KEY", "  ");
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(config.api_key, None);
            Ok(())
        });
    }

    #[test]
    fn test_environment_gate() {
        let config = Config::default();
        assert!(!config.is_instrumentation_enabled());

        let config = Config {
            environment: "production".to_string(),
            ..Config::default()
        };
        assert!(config.is_instrumentation_enabled());
    }

    #[test]
    fn test_parse_config_file() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "metronome.yaml",
                r#"
                environment: production
                ignore_head_method: false
                ignored_routes:
                  - routes/admin
                  - pattern: "^api\\."
                ignored_pathnames:
                  - /healthz
                flush_strategy: periodically,2000
            "#,
            )?;
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(config.environment, "production");
            assert!(!config.ignore_head_method);
            assert_eq!(config.ignored_routes.len(), 2);
            assert_eq!(
                config.ignored_pathnames,
                vec![IgnoreRule::literal("/healthz")]
            );
            assert_eq!(
                config.flush_strategy,
                FlushStrategy::Periodically(PeriodicStrategy { interval: 2000 })
            );
            Ok(())
        });
    }

    #[test]
    fn test_precedence() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "metronome.yaml",
                r"
                environment: staging
                batch_size: 10
            ",
            )?;
            jail.set_env("METRONOME_ENVIRONMENT", "production");
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(config.environment, "production");
            assert_eq!(config.batch_size, 10);
            Ok(())
        });
    }

    #[test]
    fn test_ignored_pathnames_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env(
                "METRONOME_IGNORED_PATHNAMES",
                r#"["/healthz", {"pattern": "^/assets/"}]"#,
            );
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(config.ignored_pathnames.len(), 2);
            assert!(config.ignored_pathnames[1].matches("/assets/logo.svg"));
            Ok(())
        });
    }

    #[test]
    fn test_parse_log_level() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("METRONOME_LOG_LEVEL", "TRACE");
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(config.log_level, LogLevel::Trace);
            Ok(())
        });
    }

    #[test]
    fn test_parse_flush_strategy_end() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("METRONOME_FLUSH_STRATEGY", "end");
            let config = get_config(Path::new("")).expect("should parse config");
            assert_eq!(config.flush_strategy, FlushStrategy::End);
            Ok(())
        });
    }

    #[test]
    fn test_bad_env_field_falls_back_to_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("METRONOME_BATCH_SIZE", "lots");
            assert!(matches!(
                get_config(Path::new("")),
                Err(ConfigError::ParseError(_))
            ));
            jail.set_env("METRONOME_ENVIRONMENT", "production");
            let config = config_or_default(get_config(Path::new("")));
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_debug_raises_log_level_to_info() {
        let config = Config {
            debug: true,
            ..Config::default()
        };
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.effective_log_level(), LogLevel::Info);

        let config = Config {
            debug: true,
            log_level: LogLevel::Trace,
            ..Config::default()
        };
        assert_eq!(config.effective_log_level(), LogLevel::Trace);

        assert_eq!(Config::default().effective_log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("metronome.yaml", "batch_size: [not, a, number]")?;
            let err = get_config(Path::new("")).expect_err("should reject config");
            assert!(matches!(err, ConfigError::ParseError(_)));
            Ok(())
        });
    }
}
