use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;

use std::time::Duration;

use crate::domain::errors::ConfigError;
use crate::domain::models::config::{
    parse_schedule, validate_marker, validate_repositories, validate_users, Config,
};
use crate::infrastructure::logging::logger::parse_log_level;

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .issue-mirror/config.yaml (project config)
    /// 3. .issue-mirror/local.yaml (local overrides, optional)
    /// 4. Environment variables (ISSUE_MIRROR_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment
    /// overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("ISSUE_MIRROR_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".issue-mirror/config.yaml"))
            .merge(Yaml::file(".issue-mirror/local.yaml"))
            .merge(Env::prefixed("ISSUE_MIRROR_").split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Adapter-specific checks (allow-lists, marker, schedule) only apply to
    /// adapters that have repositories configured; an adapter without
    /// repositories is simply not started.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let sync = &config.sync;

        if parse_log_level(&config.logging.level).is_err() {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if sync.semaphore_limit == 0 {
            return Err(ConfigError::InvalidSemaphoreLimit(sync.semaphore_limit));
        }
        if sync.debounce_ms == 0 {
            return Err(ConfigError::InvalidDebounceInterval(sync.debounce_ms));
        }
        if sync.poll_retention_ms == 0 {
            return Err(ConfigError::InvalidRetentionWindow(sync.poll_retention_ms));
        }

        if config.github.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "github.api_url cannot be empty".to_string(),
            ));
        }

        let adapters_configured = !sync.realtime_repos.is_empty() || !sync.polling_repos.is_empty();
        if adapters_configured {
            validate_users(&sync.users)?;
            validate_marker(&sync.promotion_marker)?;
        }
        if !sync.realtime_repos.is_empty() {
            validate_repositories(&sync.realtime_repos)?;
        }
        if !sync.polling_repos.is_empty() {
            validate_repositories(&sync.polling_repos)?;
            parse_schedule(
                &sync.schedule,
                Duration::from_millis(sync.poll_retention_ms),
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.webhook_port, 3000);
        assert_eq!(config.sync.schedule, "*/20 * * * * *");
        assert_eq!(config.sync.promotion_marker, "/promoted");
        assert_eq!(config.sync.debounce_ms, 1000);
        assert_eq!(config.sync.poll_retention_ms, 180_000);
        assert_eq!(config.sync.semaphore_limit, 1);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
github:
  token: secret
  webhook_port: 8080
sync:
  users: [alice, bob]
  realtime_repos: [acme/widgets]
  polling_repos: [acme/gears]
  schedule: "0 */1 * * * *"
  debounce_ms: 500
logging:
  level: debug
  format: pretty
  rotation: hourly
"#;

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.github.token, "secret");
        assert_eq!(config.github.webhook_port, 8080);
        assert_eq!(config.sync.users, vec!["alice", "bob"]);
        assert_eq!(config.sync.polling_repos, vec!["acme/gears"]);
        assert_eq!(config.sync.debounce_ms, 500);
        assert_eq!(config.sync.semaphore_limit, 1);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.format,
            crate::domain::models::config::LogFormat::Pretty
        );

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sync:\n  users: [alice]\n  realtime_repos: [acme/widgets]\n  semaphore_limit: 4"
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.sync.realtime_repos, vec!["acme/widgets"]);
        assert_eq!(config.sync.semaphore_limit, 4);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sync:\n  semaphore_limit: 0").unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidSemaphoreLimit(0))
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_intervals() {
        let mut config = Config::default();
        config.sync.debounce_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidDebounceInterval(0))
        ));

        let mut config = Config::default();
        config.sync.poll_retention_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRetentionWindow(0))
        ));
    }

    #[test]
    fn test_validate_adapter_needs_users() {
        let mut config = Config::default();
        config.sync.realtime_repos = vec!["acme/widgets".to_string()];
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyUserAllowList)
        ));
    }

    #[test]
    fn test_validate_bad_repository_name() {
        let mut config = Config::default();
        config.sync.users = vec!["alice".to_string()];
        config.sync.realtime_repos = vec!["widgets".to_string()];
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRepository(_))
        ));
    }

    #[test]
    fn test_validate_bad_schedule() {
        let mut config = Config::default();
        config.sync.users = vec!["alice".to_string()];
        config.sync.polling_repos = vec!["acme/widgets".to_string()];
        config.sync.schedule = "not a schedule".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_validate_schedule_against_retention() {
        let mut config = Config::default();
        config.sync.users = vec!["alice".to_string()];
        config.sync.polling_repos = vec!["acme/widgets".to_string()];
        ConfigLoader::validate(&config).expect("default cadence fits default retention");

        config.sync.schedule = "0 */5 * * * *".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ScheduleExceedsRetention { .. })
        ));
    }
}
