//! Load an `upwatch.toml` into the store.
//!
//! Endpoints are upserted by id. Re-seeding an existing endpoint replaces
//! its configuration but keeps its live status, failure counter and last
//! check time.

use tracing::{debug, info};
use upwatch_core::config::{EndpointConfig, RecipientConfig, RuleConfig, UpwatchConfig};

use crate::error::{StateError, StateResult};
use crate::store::StateStore;
use crate::types::*;

/// What a seeding run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub endpoints: usize,
    pub rules: usize,
    pub default_rules: usize,
    pub recipients: usize,
}

/// Upsert every endpoint, rule and recipient declared in `config`.
pub fn apply_config(store: &StateStore, config: &UpwatchConfig) -> StateResult<SeedSummary> {
    let mut summary = SeedSummary::default();

    let mut endpoints = Vec::with_capacity(config.endpoints.len());
    for declared in &config.endpoints {
        let mut endpoint = endpoint_from_config(declared)?;
        if let Some(existing) = store.get_endpoint(&endpoint.id)? {
            endpoint.last_status = existing.last_status;
            endpoint.last_checked_at = existing.last_checked_at;
            endpoint.consecutive_failures = existing.consecutive_failures;
        }
        store.put_endpoint(&endpoint)?;
        endpoints.push(endpoint);
        summary.endpoints += 1;
    }

    for declared in &config.rules {
        if store.get_endpoint(&declared.endpoint_id)?.is_none() {
            return Err(StateError::InvalidRule(format!(
                "rule {} references unknown endpoint {}",
                declared.id, declared.endpoint_id
            )));
        }
        store.put_rule(&rule_from_config(declared)?)?;
        summary.rules += 1;
    }

    if config.engine.seed_default_rules {
        for endpoint in &endpoints {
            if !store.list_rules_for_endpoint(&endpoint.id)?.is_empty() {
                continue;
            }
            for rule in default_rules_for(endpoint) {
                store.put_rule(&rule)?;
                summary.default_rules += 1;
            }
            debug!(endpoint = %endpoint.id, "default rules created");
        }
    }

    for declared in &config.recipients {
        store.put_recipient(&recipient_from_config(declared))?;
        summary.recipients += 1;
    }

    info!(
        endpoints = summary.endpoints,
        rules = summary.rules,
        default_rules = summary.default_rules,
        recipients = summary.recipients,
        "configuration applied"
    );
    Ok(summary)
}

/// The stock rule set for an endpoint.
///
/// Every endpoint gets a consecutive-failure rule and an uptime rule.
/// High-priority endpoints also get a response-time rule and a stricter
/// uptime floor.
pub fn default_rules_for(endpoint: &Endpoint) -> Vec<AlertRule> {
    let high = endpoint.priority == Priority::High;
    let mut rules = Vec::with_capacity(3);

    let mut failures = AlertRule::new(
        &format!("{}-consecutive-failures", endpoint.id),
        &endpoint.id,
        RuleCondition::ConsecutiveFailures { failures: 3 },
    );
    failures.severity = Severity::High;
    failures.cooldown_minutes = 15;
    failures.description = Some("Alert after 3 consecutive failures".to_string());
    rules.push(failures);

    if high {
        let mut slow = AlertRule::new(
            &format!("{}-response-time", endpoint.id),
            &endpoint.id,
            RuleCondition::ResponseTime {
                threshold_ms: 5000.0,
            },
        );
        slow.severity = Severity::Medium;
        slow.cooldown_minutes = 30;
        slow.description = Some("Alert when response time exceeds 5 seconds".to_string());
        rules.push(slow);
    }

    let min_uptime = if high { 99.0 } else { 95.0 };
    let mut uptime = AlertRule::new(
        &format!("{}-uptime", endpoint.id),
        &endpoint.id,
        RuleCondition::UptimePercentage {
            min_uptime,
            period_hours: 24,
        },
    );
    uptime.severity = Severity::Critical;
    uptime.cooldown_minutes = 60;
    uptime.description = Some(format!("Alert when 24h uptime drops below {min_uptime}%"));
    rules.push(uptime);

    rules
}

fn endpoint_from_config(declared: &EndpointConfig) -> StateResult<Endpoint> {
    let id = declared.id.trim();
    if id.is_empty() || id.contains(':') {
        return Err(StateError::InvalidConfig(format!(
            "invalid endpoint id: {:?}",
            declared.id
        )));
    }
    if declared.url.trim().is_empty() {
        return Err(StateError::InvalidConfig(format!("endpoint {id} has no url")));
    }

    let mut endpoint = Endpoint::new(id, &declared.name, &declared.url);
    if let Some(active) = declared.active {
        endpoint.active = active;
    }
    if let Some(interval) = declared.check_interval {
        endpoint.check_interval_secs = interval;
    }
    if let Some(timeout) = declared.timeout {
        endpoint.timeout_secs = timeout;
    }
    if let Some(codes) = &declared.expected_status_codes {
        endpoint.expected_status_codes = codes.clone();
    }
    endpoint.expected_content = declared
        .expected_content
        .clone()
        .filter(|c| !c.is_empty());
    if let Some(priority) = &declared.priority {
        endpoint.priority = priority.parse()?;
    }
    if let Some(environment) = &declared.environment {
        endpoint.environment = environment.clone();
    }

    endpoint.maintenance = match (declared.maintenance_window_start, declared.maintenance_window_end) {
        (None, None) => None,
        (Some(start), Some(end)) if start <= end => Some(MaintenanceWindow { start, end }),
        (Some(_), Some(_)) => {
            return Err(StateError::InvalidConfig(format!(
                "endpoint {id}: maintenance window ends before it starts"
            )));
        }
        _ => {
            return Err(StateError::InvalidConfig(format!(
                "endpoint {id}: maintenance window needs both start and end"
            )));
        }
    };

    Ok(endpoint)
}

fn rule_from_config(declared: &RuleConfig) -> StateResult<AlertRule> {
    let condition = RuleCondition::decode(&declared.rule_type, &declared.conditions)?;
    let mut rule = AlertRule::new(&declared.id, &declared.endpoint_id, condition);
    if let Some(active) = declared.active {
        rule.active = active;
    }
    if let Some(severity) = &declared.severity {
        rule.severity = severity.parse()?;
    }
    if let Some(cooldown) = declared.cooldown_minutes {
        rule.cooldown_minutes = cooldown;
    }
    rule.description = declared.description.clone();
    Ok(rule)
}

fn recipient_from_config(declared: &RecipientConfig) -> Recipient {
    Recipient {
        id: declared.id.clone(),
        name: declared.name.clone(),
        phone: declared.phone.clone(),
        notifications_enabled: declared.notifications_enabled.unwrap_or(true),
    }
}
