//! Alert texts. Kept short enough for a text message.

use chrono::{DateTime, Utc};

use upwatch_state::{AlertRule, Endpoint};

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%d/%m/%Y %H:%M").to_string()
}

/// Sent when an endpoint goes down.
pub fn down_message(endpoint: &Endpoint, error: Option<&str>, at: DateTime<Utc>) -> String {
    let mut lines = vec![
        "API DOWN".to_string(),
        endpoint.name.clone(),
        endpoint.url.clone(),
    ];
    if let Some(error) = error {
        lines.push(error.to_string());
    }
    lines.push(stamp(at));
    lines.push("Automatic checks continue...".to_string());
    lines.join("\n")
}

/// Sent when an endpoint comes back up.
pub fn recovery_message(
    endpoint: &Endpoint,
    response_time_ms: Option<f64>,
    at: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        "API RECOVERED".to_string(),
        endpoint.name.clone(),
        endpoint.url.clone(),
    ];
    if let Some(ms) = response_time_ms.filter(|ms| *ms > 0.0) {
        lines.push(format!("Response time: {ms}ms"));
    }
    lines.push(stamp(at));
    lines.join("\n")
}

/// Sent when an alert rule fires.
pub fn rule_message(
    rule: &AlertRule,
    endpoint: &Endpoint,
    observed: &str,
    at: DateTime<Utc>,
) -> String {
    let title = rule
        .description
        .clone()
        .unwrap_or_else(|| rule.condition.kind().replace('_', " "));
    [
        format!("[{}] {}", rule.severity, endpoint.display_name()),
        title,
        observed.to_string(),
        stamp(at),
    ]
    .join("\n")
}
