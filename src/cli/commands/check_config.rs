//! `check-config`: load, validate and summarise the configuration.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{join_or_dash, output, CommandOutput};
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub api_url: String,
    pub authenticated: bool,
    pub signature_verification: bool,
    pub webhook_address: String,
    pub users: Vec<String>,
    pub realtime_repos: Vec<String>,
    pub polling_repos: Vec<String>,
    pub schedule: String,
    pub promotion_marker: String,
    pub debounce_ms: u64,
    pub poll_retention_ms: u64,
    pub semaphore_limit: usize,
    pub log_level: String,
}

impl From<&Config> for ConfigSummary {
    fn from(config: &Config) -> Self {
        Self {
            api_url: config.github.api_url.clone(),
            authenticated: !config.github.token.is_empty(),
            signature_verification: !config.github.webhook_secret.is_empty(),
            webhook_address: format!(
                "{}:{}",
                config.github.webhook_host, config.github.webhook_port
            ),
            users: config.sync.users.clone(),
            realtime_repos: config.sync.realtime_repos.clone(),
            polling_repos: config.sync.polling_repos.clone(),
            schedule: config.sync.schedule.clone(),
            promotion_marker: config.sync.promotion_marker.clone(),
            debounce_ms: config.sync.debounce_ms,
            poll_retention_ms: config.sync.poll_retention_ms,
            semaphore_limit: config.sync.semaphore_limit,
            log_level: config.logging.level.clone(),
        }
    }
}

impl CommandOutput for ConfigSummary {
    fn to_human(&self) -> String {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        [
            "Configuration is valid.".to_string(),
            String::new(),
            format!("API URL:            {}", self.api_url),
            format!("Authenticated:      {}", yes_no(self.authenticated)),
            format!("Verify signatures:  {}", yes_no(self.signature_verification)),
            format!("Webhook address:    {}", self.webhook_address),
            format!("Users:              {}", join_or_dash(&self.users)),
            format!("Realtime repos:     {}", join_or_dash(&self.realtime_repos)),
            format!("Polling repos:      {}", join_or_dash(&self.polling_repos)),
            format!("Schedule:           {}", self.schedule),
            format!("Promotion marker:   {}", self.promotion_marker),
            format!("Debounce:           {}ms", self.debounce_ms),
            format!("Poll retention:     {}ms", self.poll_retention_ms),
            format!("Semaphore limit:    {}", self.semaphore_limit),
            format!("Log level:          {}", self.log_level),
        ]
        .join("\n")
    }
}

pub fn execute(config: &Config, json_mode: bool) -> Result<()> {
    output(&ConfigSummary::from(config), json_mode);
    Ok(())
}
