//! Alert rule evaluation.
//!
//! Rules are judged against the endpoint's committed state, the fresh
//! check record and, for window rules, the endpoint's recent history.
//! Evaluation is pure; cooldowns are applied by the caller.

use chrono::{DateTime, Duration, Utc};

use upwatch_state::{AlertRule, CheckRecord, Endpoint, RuleCondition};
use upwatch_stats::compute_stats;

/// A rule that fired, with the value that made it fire.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub observed: String,
}

/// Check one rule.
///
/// `history` holds the endpoint's records, time-ascending; only records
/// inside the rule's window are considered. The fresh record is expected
/// to be part of it once persisted.
pub fn check(
    rule: &AlertRule,
    endpoint: &Endpoint,
    record: &CheckRecord,
    history: &[CheckRecord],
    now: DateTime<Utc>,
) -> Option<Trigger> {
    if !rule.active {
        return None;
    }

    match &rule.condition {
        RuleCondition::ConsecutiveFailures { failures } => (endpoint.consecutive_failures
            >= *failures)
            .then(|| Trigger {
                observed: format!("{} consecutive failures", endpoint.consecutive_failures),
            }),

        RuleCondition::ResponseTime { threshold_ms } => record
            .response_time_ms
            .filter(|ms| ms > threshold_ms)
            .map(|ms| Trigger {
                observed: format!("response time {ms}ms (threshold {threshold_ms}ms)"),
            }),

        RuleCondition::StatusCode { expected_codes } => record
            .status_code
            .filter(|code| !expected_codes.contains(code))
            .map(|code| Trigger {
                observed: format!("status code {code}"),
            }),

        RuleCondition::UptimePercentage {
            min_uptime,
            period_hours,
        } => {
            let window = in_window(history, now, Duration::hours(i64::from(*period_hours)));
            let stats = compute_stats(&window);
            (stats.total_checks > 0 && stats.uptime_pct < *min_uptime).then(|| Trigger {
                observed: format!(
                    "uptime {}% over {}h (minimum {}%)",
                    stats.uptime_pct, period_hours, min_uptime
                ),
            })
        }

        RuleCondition::SslExpiry {
            days_before,
            period_hours,
        } => {
            let expires_at = record.ssl_expires_at.or_else(|| {
                in_window(history, now, Duration::hours(i64::from(*period_hours)))
                    .iter()
                    .rev()
                    .find_map(|r| r.ssl_expires_at)
            })?;
            let remaining = expires_at.signed_duration_since(now);
            // A lead time beyond chrono's range covers every expiry.
            let lead = Duration::try_days(*days_before).unwrap_or(if *days_before < 0 {
                Duration::MIN
            } else {
                Duration::MAX
            });
            (remaining <= lead).then(|| Trigger {
                observed: format!(
                    "certificate expires in {} days ({})",
                    remaining.num_days(),
                    expires_at.format("%d/%m/%Y")
                ),
            })
        }
    }
}

/// Whether the rule's condition holds.
pub fn evaluate(
    rule: &AlertRule,
    endpoint: &Endpoint,
    record: &CheckRecord,
    history: &[CheckRecord],
    now: DateTime<Utc>,
) -> bool {
    check(rule, endpoint, record, history, now).is_some()
}

fn in_window(history: &[CheckRecord], now: DateTime<Utc>, window: Duration) -> Vec<CheckRecord> {
    let start = now
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    history
        .iter()
        .filter(|r| start <= r.checked_at && r.checked_at <= now)
        .cloned()
        .collect()
}
