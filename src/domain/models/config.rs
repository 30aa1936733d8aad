use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ConfigError;

/// Main configuration structure for the mirror
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Issue tracker (GitHub) access and webhook endpoint
    #[serde(default)]
    pub github: GitHubConfig,

    /// Synchronization behaviour
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GitHubConfig {
    /// Personal access token. Empty means unauthenticated requests.
    #[serde(default)]
    pub token: String,

    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Secret used to verify webhook signatures. Empty disables verification.
    #[serde(default)]
    pub webhook_secret: String,

    /// Address the webhook receiver binds to
    #[serde(default = "default_webhook_host")]
    pub webhook_host: String,

    /// Port the webhook receiver binds to
    #[serde(default = "default_webhook_port")]
    pub webhook_port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_webhook_port() -> u16 {
    3000
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            webhook_secret: String::new(),
            webhook_host: default_webhook_host(),
            webhook_port: default_webhook_port(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Synchronization configuration shared by both ingestion adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Users whose issues are mirrored (author or assignee)
    #[serde(default)]
    pub users: Vec<String>,

    /// Repositories delivered through webhooks
    #[serde(default)]
    pub realtime_repos: Vec<String>,

    /// Repositories swept by the scheduled search
    #[serde(default)]
    pub polling_repos: Vec<String>,

    /// Cron expression (with seconds) driving the search sweep
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Comment command that promotes a fork issue
    #[serde(default = "default_promotion_marker")]
    pub promotion_marker: String,

    /// Quiet interval before a merged webhook burst is flushed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long a poll cycle's notified set is remembered
    #[serde(default = "default_poll_retention_ms")]
    pub poll_retention_ms: u64,

    /// Overlap subtracted from the search cursor
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,

    /// Concurrent downstream writers per resource
    #[serde(default = "default_semaphore_limit")]
    pub semaphore_limit: usize,
}

fn default_schedule() -> String {
    "*/20 * * * * *".to_string()
}

fn default_promotion_marker() -> String {
    "/promoted".to_string()
}

const fn default_debounce_ms() -> u64 {
    1000
}

const fn default_poll_retention_ms() -> u64 {
    180_000
}

const fn default_clock_skew_secs() -> u64 {
    10
}

const fn default_semaphore_limit() -> usize {
    1
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            users: vec![],
            realtime_repos: vec![],
            polling_repos: vec![],
            schedule: default_schedule(),
            promotion_marker: default_promotion_marker(),
            debounce_ms: default_debounce_ms(),
            poll_retention_ms: default_poll_retention_ms(),
            clock_skew_secs: default_clock_skew_secs(),
            semaphore_limit: default_semaphore_limit(),
        }
    }
}

impl SyncConfig {
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            repos: self.realtime_repos.clone(),
            users: self.users.clone(),
            promotion_marker: self.promotion_marker.clone(),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub fn searcher_config(&self) -> SearcherConfig {
        SearcherConfig {
            repos: self.polling_repos.clone(),
            users: self.users.clone(),
            schedule: self.schedule.clone(),
            promotion_marker: self.promotion_marker.clone(),
            retention: Duration::from_millis(self.poll_retention_ms),
            clock_skew: Duration::from_secs(self.clock_skew_secs),
            start_at: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,

    /// Also log to stdout when writing to files
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_enable_stdout() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
            enable_stdout: default_enable_stdout(),
        }
    }
}

/// Options of the push (webhook) adapter
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub repos: Vec<String>,
    pub users: Vec<String>,
    pub promotion_marker: String,
    pub debounce: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        SyncConfig::default().listener_config()
    }
}

/// Options of the poll (search) adapter
#[derive(Debug, Clone)]
pub struct SearcherConfig {
    pub repos: Vec<String>,
    pub users: Vec<String>,
    pub schedule: String,
    pub promotion_marker: String,
    pub retention: Duration,
    pub clock_skew: Duration,
    /// Cursor used by the first cycle. Defaults to construction time.
    pub start_at: Option<DateTime<Utc>>,
}

impl Default for SearcherConfig {
    fn default() -> Self {
        SyncConfig::default().searcher_config()
    }
}

/// Deduplicate and check `owner/name` repository names.
pub fn validate_repositories(repos: &[String]) -> Result<BTreeSet<String>, ConfigError> {
    let repos: BTreeSet<String> = repos.iter().map(|r| r.trim().to_string()).collect();
    if repos.is_empty() {
        return Err(ConfigError::EmptyRepositoryAllowList);
    }
    for repo in &repos {
        match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => return Err(ConfigError::InvalidRepository(repo.clone())),
        }
    }
    Ok(repos)
}

/// Deduplicate the user allow-list; it must not be empty.
pub fn validate_users(users: &[String]) -> Result<BTreeSet<String>, ConfigError> {
    let users: BTreeSet<String> = users
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if users.is_empty() {
        return Err(ConfigError::EmptyUserAllowList);
    }
    Ok(users)
}

pub fn validate_marker(marker: &str) -> Result<String, ConfigError> {
    let marker = marker.trim();
    if marker.is_empty() || marker.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidPromotionMarker(marker.to_string()));
    }
    Ok(marker.to_string())
}

/// Upcoming ticks inspected when measuring a schedule's spacing.
const SCHEDULE_SAMPLE: usize = 64;

/// Parse a cron `expression` (with seconds) for the search sweep.
///
/// Poll dedup only remembers a cycle for `retention`, so a schedule whose
/// ticks can be further apart than that is rejected.
pub fn parse_schedule(expression: &str, retention: Duration) -> Result<Schedule, ConfigError> {
    let schedule = Schedule::from_str(expression).map_err(|e| ConfigError::InvalidSchedule {
        expression: expression.to_string(),
        reason: e.to_string(),
    })?;

    let ticks: Vec<DateTime<Utc>> = schedule.upcoming(Utc).take(SCHEDULE_SAMPLE).collect();
    let period = ticks
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).to_std().unwrap_or_default())
        .max()
        .unwrap_or_default();
    if period > retention {
        return Err(ConfigError::ScheduleExceedsRetention {
            expression: expression.to_string(),
            period_secs: period.as_secs(),
            retention_secs: retention.as_secs(),
        });
    }
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_repositories_dedups() {
        let repos = validate_repositories(&[
            "acme/widgets".to_string(),
            " acme/widgets ".to_string(),
            "acme/gears".to_string(),
        ])
        .unwrap();
        assert_eq!(repos.len(), 2);
    }

    #[test]
    fn test_validate_repositories_rejects_bad_names() {
        for bad in ["widgets", "/widgets", "acme/", "acme/widgets/extra"] {
            let err = validate_repositories(&[bad.to_string()]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidRepository(_)), "{bad}");
        }
        assert!(matches!(
            validate_repositories(&[]),
            Err(ConfigError::EmptyRepositoryAllowList)
        ));
    }

    #[test]
    fn test_validate_users() {
        assert!(matches!(
            validate_users(&[" ".to_string()]),
            Err(ConfigError::EmptyUserAllowList)
        ));
        assert_eq!(validate_users(&["alice".to_string()]).unwrap().len(), 1);
    }

    #[test]
    fn test_validate_marker() {
        assert_eq!(validate_marker(" /promoted ").unwrap(), "/promoted");
        assert!(validate_marker("").is_err());
        assert!(validate_marker("/pro moted").is_err());
    }

    #[test]
    fn test_parse_schedule() {
        let retention = Duration::from_secs(180);
        assert!(parse_schedule(&default_schedule(), retention).is_ok());
        assert!(parse_schedule("0 */3 * * * *", retention).is_ok());
        assert!(matches!(
            parse_schedule("every five minutes", retention),
            Err(ConfigError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_parse_schedule_rejects_cadence_beyond_retention() {
        let err = parse_schedule("0 */5 * * * *", Duration::from_secs(180)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ScheduleExceedsRetention {
                period_secs: 300,
                retention_secs: 180,
                ..
            }
        ));
    }

    #[test]
    fn test_default_cadence_fits_retention() {
        let sync = SyncConfig::default();
        parse_schedule(
            &sync.schedule,
            Duration::from_millis(sync.poll_retention_ms),
        )
        .expect("default schedule should fit the default retention");
    }

    #[test]
    fn test_adapter_configs_carry_sync_settings() {
        let sync = SyncConfig {
            debounce_ms: 250,
            poll_retention_ms: 60_000,
            ..Default::default()
        };
        assert_eq!(sync.listener_config().debounce, Duration::from_millis(250));
        assert_eq!(sync.searcher_config().retention, Duration::from_secs(60));
        assert_eq!(sync.searcher_config().clock_skew, Duration::from_secs(10));
    }
}
