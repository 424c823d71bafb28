//! Domain types for the upwatch state store.
//!
//! Endpoints, check records, alert rules and recipients. All types are
//! serializable to/from JSON for storage in redb tables.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Unique identifier for a monitored endpoint.
pub type EndpointId = String;

/// Unique identifier for an alert rule.
pub type RuleId = String;

/// Unique identifier for a notification recipient.
pub type RecipientId = String;

pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_COOLDOWN_MINUTES: u32 = 10;

// ── Status ────────────────────────────────────────────────────────

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Up,
    Down,
}

/// Last known status of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Up,
    Down,
    #[default]
    Unknown,
}

impl From<CheckStatus> for EndpointStatus {
    fn from(status: CheckStatus) -> Self {
        match status {
            CheckStatus::Up => EndpointStatus::Up,
            CheckStatus::Down => EndpointStatus::Down,
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
        })
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EndpointStatus::Up => "up",
            EndpointStatus::Down => "down",
            EndpointStatus::Unknown => "unknown",
        })
    }
}

// ── Endpoint ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = StateError;

    fn from_str(s: &str) -> StateResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(StateError::InvalidConfig(format!("unknown priority: {other}"))),
        }
    }
}

/// A time range during which an endpoint is neither checked nor alerted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MaintenanceWindow {
    /// Bounds are inclusive.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// A monitored HTTP target with its configuration and live status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    /// Target URL, stored without trailing slashes.
    pub url: String,
    pub active: bool,
    pub check_interval_secs: u64,
    pub timeout_secs: u64,
    /// Status codes that count as up. Empty accepts any response.
    pub expected_status_codes: Vec<u16>,
    pub expected_content: Option<String>,
    pub priority: Priority,
    pub environment: String,
    pub maintenance: Option<MaintenanceWindow>,
    pub last_status: EndpointStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl Endpoint {
    /// Create an endpoint with the stock defaults.
    pub fn new(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: normalize_url(url),
            active: true,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            expected_status_codes: vec![200],
            expected_content: None,
            priority: Priority::Medium,
            environment: "production".to_string(),
            maintenance: None,
            last_status: EndpointStatus::Unknown,
            last_checked_at: None,
            consecutive_failures: 0,
        }
    }

    /// Name with the environment tag, e.g. `Orders API (staging)`.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.environment)
    }

    pub fn in_maintenance(&self, now: DateTime<Utc>) -> bool {
        self.maintenance.is_some_and(|w| w.contains(now))
    }

    /// When the next check becomes due. `None` means never checked.
    ///
    /// An interval too large to represent is never due again.
    pub fn next_check_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at.map(|at| {
            i64::try_from(self.check_interval_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|interval| at.checked_add_signed(interval))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// Active and either never checked or past its interval.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.next_check_at() {
            None => true,
            Some(next) => next <= now,
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Strip trailing slashes from a URL.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

// ── Check record ──────────────────────────────────────────────────

/// One immutable probe outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckRecord {
    pub id: String,
    pub endpoint_id: EndpointId,
    pub status: CheckStatus,
    /// Absent when no HTTP response was received.
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
    /// Set exactly when `status` is down.
    pub error_message: Option<String>,
    /// Peer certificate expiry for HTTPS targets.
    pub ssl_expires_at: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

impl CheckRecord {
    pub fn up(
        endpoint_id: &str,
        status_code: Option<u16>,
        response_time_ms: Option<f64>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint_id: endpoint_id.to_string(),
            status: CheckStatus::Up,
            status_code,
            response_time_ms,
            error_message: None,
            ssl_expires_at: None,
            checked_at,
        }
    }

    pub fn down(
        endpoint_id: &str,
        status_code: Option<u16>,
        response_time_ms: Option<f64>,
        error_message: &str,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint_id: endpoint_id.to_string(),
            status: CheckStatus::Down,
            status_code,
            response_time_ms,
            error_message: Some(error_message.to_string()),
            ssl_expires_at: None,
            checked_at,
        }
    }

    pub fn with_ssl_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.ssl_expires_at = expires_at;
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == CheckStatus::Up
    }

    /// Build the composite key for the records table.
    ///
    /// Keys sort by endpoint, then check time, so a range scan over one
    /// endpoint yields records in time order.
    pub fn table_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.endpoint_id,
            time_key(self.checked_at),
            self.id
        )
    }
}

/// Zero-padded millisecond timestamp that sorts lexicographically.
pub fn time_key(at: DateTime<Utc>) -> String {
    format!("{:020}", at.timestamp_millis().max(0))
}

// ── Alert rules ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl FromStr for Severity {
    type Err = StateError;

    fn from_str(s: &str) -> StateResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(StateError::InvalidConfig(format!("unknown severity: {other}"))),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        })
    }
}

/// Typed parameters of an alert rule, one variant per rule type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleCondition {
    ConsecutiveFailures {
        #[serde(default = "default_failures")]
        failures: u32,
    },
    ResponseTime {
        #[serde(
            rename = "threshold",
            alias = "threshold_ms",
            default = "default_threshold_ms"
        )]
        threshold_ms: f64,
    },
    StatusCode {
        #[serde(default = "default_expected_codes")]
        expected_codes: Vec<u16>,
    },
    UptimePercentage {
        #[serde(default = "default_min_uptime")]
        min_uptime: f64,
        #[serde(default = "default_period_hours")]
        period_hours: u32,
    },
    SslExpiry {
        #[serde(default = "default_days_before")]
        days_before: i64,
        #[serde(default = "default_period_hours")]
        period_hours: u32,
    },
}

fn default_failures() -> u32 {
    3
}

fn default_threshold_ms() -> f64 {
    5000.0
}

fn default_expected_codes() -> Vec<u16> {
    vec![200, 201, 204]
}

fn default_min_uptime() -> f64 {
    95.0
}

fn default_period_hours() -> u32 {
    24
}

fn default_days_before() -> i64 {
    30
}

impl RuleCondition {
    /// Decode a free-form condition table for the given rule type.
    ///
    /// Missing parameters take their defaults; unknown rule types,
    /// unknown parameter names and ill-typed parameters are rejected.
    pub fn decode(rule_type: &str, conditions: &toml::Table) -> StateResult<Self> {
        let mut table = conditions.clone();
        table.insert(
            "type".to_string(),
            toml::Value::String(rule_type.trim().to_string()),
        );
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| {
                StateError::InvalidRule(format!("{rule_type}: {}", e.message()))
            })
    }

    /// The rule type name as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleCondition::ConsecutiveFailures { .. } => "consecutive_failures",
            RuleCondition::ResponseTime { .. } => "response_time",
            RuleCondition::StatusCode { .. } => "status_code",
            RuleCondition::UptimePercentage { .. } => "uptime_percentage",
            RuleCondition::SslExpiry { .. } => "ssl_expiry",
        }
    }

    /// How much history the rule needs, if it looks past the latest record.
    pub fn history_window(&self) -> Option<Duration> {
        match self {
            RuleCondition::UptimePercentage { period_hours, .. }
            | RuleCondition::SslExpiry { period_hours, .. } => {
                Some(Duration::hours(i64::from(*period_hours)))
            }
            _ => None,
        }
    }
}

/// When to notify about an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    pub id: RuleId,
    pub endpoint_id: EndpointId,
    pub condition: RuleCondition,
    pub active: bool,
    pub severity: Severity,
    pub cooldown_minutes: u32,
    pub description: Option<String>,
}

impl AlertRule {
    pub fn new(id: &str, endpoint_id: &str, condition: RuleCondition) -> Self {
        Self {
            id: id.to_string(),
            endpoint_id: endpoint_id.to_string(),
            condition,
            active: true,
            severity: Severity::Medium,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            description: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::minutes(i64::from(self.cooldown_minutes))
    }

    /// Build the composite key for the rules table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.endpoint_id, self.id)
    }
}

// ── Recipients ────────────────────────────────────────────────────

/// Someone who receives alert text messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    pub id: RecipientId,
    pub name: String,
    pub phone: Option<String>,
    pub notifications_enabled: bool,
}

impl Recipient {
    /// Notifications enabled and a phone number on file.
    pub fn can_receive(&self) -> bool {
        self.notifications_enabled && self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}
