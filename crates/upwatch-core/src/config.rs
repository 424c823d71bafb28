//! upwatch.toml configuration parser.
//!
//! The file declares the engine settings, the notification channel and
//! the endpoints, alert rules and recipients that seed the store. Rule
//! conditions stay a free-form table here; they are decoded into typed
//! conditions when the rule is loaded into the store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpwatchConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub recipients: Vec<RecipientConfig>,
}

/// Scheduler and prober tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on endpoints probed at the same time.
    pub max_concurrency: usize,
    /// Extra attempts after a transport failure.
    pub probe_retries: u32,
    /// Pause between attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Probe and persist, but never notify.
    pub dry_run: bool,
    pub user_agent: String,
    /// Create the stock rule set for endpoints that have no rules.
    pub seed_default_rules: bool,
    pub data_dir: PathBuf,
    /// Pause between passes in `watch` mode, in seconds.
    pub watch_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            probe_retries: 2,
            retry_delay_ms: 1000,
            dry_run: false,
            user_agent: format!("upwatch/{}", env!("CARGO_PKG_VERSION")),
            seed_default_rules: false,
            data_dir: PathBuf::from("/var/lib/upwatch"),
            watch_interval_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }
}

/// Outbound notification channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Write alerts to the log only.
    #[default]
    Log,
    /// HTTP SMS gateway taking `client`, `password`, `from`, `phone` and
    /// `text` as query parameters.
    SmsGateway {
        url: String,
        client: String,
        password: String,
        sender: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    pub active: Option<bool>,
    /// Seconds between checks.
    pub check_interval: Option<u64>,
    /// Probe timeout in seconds.
    pub timeout: Option<u64>,
    pub expected_status_codes: Option<Vec<u16>>,
    pub expected_content: Option<String>,
    /// "low", "medium" or "high".
    pub priority: Option<String>,
    pub environment: Option<String>,
    pub maintenance_window_start: Option<DateTime<Utc>>,
    pub maintenance_window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    pub endpoint_id: String,
    /// consecutive_failures, response_time, status_code,
    /// uptime_percentage or ssl_expiry.
    pub rule_type: String,
    #[serde(default)]
    pub conditions: toml::Table,
    pub active: Option<bool>,
    /// "low", "medium", "high" or "critical".
    pub severity: Option<String>,
    pub cooldown_minutes: Option<u32>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientConfig {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub notifications_enabled: Option<bool>,
}

impl UpwatchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: UpwatchConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a minimal upwatch.toml watching a single URL.
    pub fn scaffold(name: &str, url: &str) -> Self {
        let mut conditions = toml::Table::new();
        conditions.insert("failures".to_string(), toml::Value::Integer(3));

        UpwatchConfig {
            engine: EngineConfig::default(),
            notifier: NotifierConfig::Log,
            endpoints: vec![EndpointConfig {
                id: name.to_string(),
                name: name.to_string(),
                url: url.to_string(),
                active: Some(true),
                check_interval: Some(300),
                timeout: Some(10),
                expected_status_codes: Some(vec![200]),
                expected_content: None,
                priority: Some("medium".to_string()),
                environment: Some("production".to_string()),
                maintenance_window_start: None,
                maintenance_window_end: None,
            }],
            rules: vec![RuleConfig {
                id: format!("{name}-consecutive-failures"),
                endpoint_id: name.to_string(),
                rule_type: "consecutive_failures".to_string(),
                conditions,
                active: Some(true),
                severity: Some("high".to_string()),
                cooldown_minutes: Some(15),
                description: Some("three failed checks in a row".to_string()),
            }],
            recipients: Vec::new(),
        }
    }
}
