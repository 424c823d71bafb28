//! Endpoint status decisions.
//!
//! [`decide`] turns a probe outcome plus the endpoint's prior status into
//! the new status and failure counter. It performs no I/O; the scheduler
//! commits the result.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use upwatch_state::{CheckRecord, Endpoint, EndpointStatus};

use crate::checker::{ErrorKind, ProbeOutcome};

/// Why a check was judged down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownReason {
    Transport(ErrorKind),
    UnexpectedStatus(u16),
    ContentMismatch,
}

impl DownReason {
    /// The message stored on the check record.
    pub fn message(&self) -> String {
        match self {
            DownReason::Transport(kind) => kind.describe().to_string(),
            DownReason::UnexpectedStatus(code) => status_description(*code),
            DownReason::ContentMismatch => "expected content not found".to_string(),
        }
    }
}

/// Short description of an HTTP error status.
pub fn status_description(code: u16) -> String {
    match code {
        400 => "bad request".to_string(),
        401 => "unauthorized".to_string(),
        403 => "forbidden".to_string(),
        404 => "not found".to_string(),
        500 => "internal server error".to_string(),
        502 => "bad gateway".to_string(),
        503 => "service unavailable".to_string(),
        504 => "gateway timeout".to_string(),
        other => format!("HTTP error {other}"),
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDecision {
    pub new_status: EndpointStatus,
    pub new_failure_count: u32,
    /// New status differs from the prior one.
    pub transitioned: bool,
    /// Set exactly when the new status is down.
    pub reason: Option<DownReason>,
}

impl StatusDecision {
    pub fn is_up(&self) -> bool {
        self.new_status == EndpointStatus::Up
    }

    /// Apply the decision to an owned endpoint and hand it back.
    pub fn apply(&self, mut endpoint: Endpoint, checked_at: DateTime<Utc>) -> Endpoint {
        endpoint.last_status = self.new_status;
        endpoint.consecutive_failures = self.new_failure_count;
        endpoint.last_checked_at = Some(checked_at);
        endpoint
    }
}

/// Decide the endpoint's status after a probe.
///
/// Up iff the probe got a response, its code is in `expected_codes` (an
/// empty set accepts any code) and, when content was checked, it matched.
pub fn decide(
    prior_status: EndpointStatus,
    prior_failures: u32,
    outcome: &ProbeOutcome,
    expected_codes: &[u16],
) -> StatusDecision {
    let reason = if !outcome.success {
        Some(DownReason::Transport(
            outcome.error_kind.unwrap_or(ErrorKind::Other),
        ))
    } else {
        match outcome.status_code {
            Some(code) if !expected_codes.is_empty() && !expected_codes.contains(&code) => {
                Some(DownReason::UnexpectedStatus(code))
            }
            _ if outcome.content_matched == Some(false) => Some(DownReason::ContentMismatch),
            _ => None,
        }
    };

    let (new_status, new_failure_count) = match reason {
        None => (EndpointStatus::Up, 0),
        Some(_) => (EndpointStatus::Down, prior_failures.saturating_add(1)),
    };

    StatusDecision {
        new_status,
        new_failure_count,
        transitioned: new_status != prior_status,
        reason,
    }
}

/// Log a status transition for an endpoint.
pub fn log_transition(endpoint: &Endpoint, decision: &StatusDecision) {
    if !decision.transitioned {
        return;
    }
    match decision.reason {
        Some(reason) => warn!(
            endpoint = %endpoint.id,
            from = %endpoint.last_status,
            reason = %reason.message(),
            failures = decision.new_failure_count,
            "endpoint went down"
        ),
        None => info!(
            endpoint = %endpoint.id,
            from = %endpoint.last_status,
            "endpoint is up"
        ),
    }
}

/// The check record reflecting a decision.
pub fn build_record(
    endpoint_id: &str,
    outcome: &ProbeOutcome,
    decision: &StatusDecision,
    checked_at: DateTime<Utc>,
) -> CheckRecord {
    let record = match decision.reason {
        None => CheckRecord::up(
            endpoint_id,
            outcome.status_code,
            outcome.response_time_ms,
            checked_at,
        ),
        // No response was received, so there is no response time to keep.
        Some(reason @ DownReason::Transport(_)) => {
            CheckRecord::down(endpoint_id, None, None, &reason.message(), checked_at)
        }
        Some(reason) => CheckRecord::down(
            endpoint_id,
            outcome.status_code,
            outcome.response_time_ms,
            &reason.message(),
            checked_at,
        ),
    };
    record.with_ssl_expiry(outcome.ssl_expires_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use upwatch_state::CheckStatus;

    fn ok(code: u16) -> ProbeOutcome {
        ProbeOutcome::responded(code, 42.0)
    }

    fn refused() -> ProbeOutcome {
        ProbeOutcome::failed(ErrorKind::ConnectionRefused, "tcp connect error", Some(3.0))
    }

    #[test]
    fn up_when_code_expected() {
        let d = decide(EndpointStatus::Unknown, 0, &ok(200), &[200]);
        assert_eq!(d.new_status, EndpointStatus::Up);
        assert_eq!(d.new_failure_count, 0);
        assert!(d.transitioned);
        assert_eq!(d.reason, None);
    }

    #[test]
    fn down_when_code_unexpected() {
        let d = decide(EndpointStatus::Up, 0, &ok(503), &[200]);
        assert_eq!(d.new_status, EndpointStatus::Down);
        assert_eq!(d.new_failure_count, 1);
        assert!(d.transitioned);
        assert_eq!(d.reason, Some(DownReason::UnexpectedStatus(503)));
    }

    #[test]
    fn empty_expected_set_accepts_any_response() {
        let d = decide(EndpointStatus::Up, 0, &ok(500), &[]);
        assert!(d.is_up());
        assert!(!d.transitioned);
    }

    #[test]
    fn transport_failure_is_down() {
        let d = decide(EndpointStatus::Up, 0, &refused(), &[200]);
        assert_eq!(d.new_status, EndpointStatus::Down);
        assert_eq!(
            d.reason,
            Some(DownReason::Transport(ErrorKind::ConnectionRefused))
        );
    }

    #[test]
    fn content_mismatch_is_down() {
        let outcome = ok(200).with_content_match(false);
        let d = decide(EndpointStatus::Up, 0, &outcome, &[200]);
        assert_eq!(d.reason, Some(DownReason::ContentMismatch));

        let outcome = ok(200).with_content_match(true);
        assert!(decide(EndpointStatus::Up, 0, &outcome, &[200]).is_up());
    }

    #[test]
    fn failure_counter_increments_by_one_per_down() {
        let mut status = EndpointStatus::Up;
        let mut failures = 0;
        for expected in 1..=5 {
            let d = decide(status, failures, &refused(), &[200]);
            assert_eq!(d.new_failure_count, expected);
            // Only the first down is a transition.
            assert_eq!(d.transitioned, expected == 1);
            status = d.new_status;
            failures = d.new_failure_count;
        }
    }

    #[test]
    fn failure_counter_resets_on_recovery() {
        let d = decide(EndpointStatus::Down, 7, &ok(200), &[200]);
        assert_eq!(d.new_failure_count, 0);
        assert!(d.transitioned);
    }

    #[test]
    fn failure_counter_saturates() {
        let d = decide(EndpointStatus::Down, u32::MAX, &refused(), &[200]);
        assert_eq!(d.new_failure_count, u32::MAX);
    }

    #[test]
    fn up_down_up_counts_zero_one_zero() {
        let first = decide(EndpointStatus::Up, 0, &ok(200), &[200]);
        let second = decide(first.new_status, first.new_failure_count, &refused(), &[200]);
        let third = decide(second.new_status, second.new_failure_count, &ok(200), &[200]);
        let counts: Vec<u32> = [first, second, third]
            .iter()
            .map(|d| d.new_failure_count)
            .collect();
        assert_eq!(counts, vec![0, 1, 0]);
        assert!(second.transitioned && third.transitioned);
    }

    #[test]
    fn status_descriptions() {
        assert_eq!(status_description(404), "not found");
        assert_eq!(status_description(504), "gateway timeout");
        assert_eq!(status_description(418), "HTTP error 418");
    }

    #[test]
    fn record_reflects_decision() {
        let at = Utc.with_ymd_and_hms(2025, 7, 6, 12, 0, 0).unwrap();

        let outcome = refused();
        let d = decide(EndpointStatus::Up, 0, &outcome, &[200]);
        let record = build_record("api", &outcome, &d, at);
        assert_eq!(record.status, CheckStatus::Down);
        assert_eq!(record.status_code, None);
        assert_eq!(record.error_message.as_deref(), Some("connection refused"));
        assert_eq!(record.response_time_ms, None);

        let outcome = ok(503);
        let d = decide(EndpointStatus::Up, 0, &outcome, &[200]);
        let record = build_record("api", &outcome, &d, at);
        assert_eq!(record.status_code, Some(503));
        assert_eq!(record.error_message.as_deref(), Some("service unavailable"));

        let outcome = ok(200);
        let d = decide(EndpointStatus::Down, 2, &outcome, &[200]);
        let record = build_record("api", &outcome, &d, at);
        assert!(record.is_up());
        assert_eq!(record.error_message, None);
        assert_eq!(record.response_time_ms, Some(42.0));
    }

    #[test]
    fn timed_out_record_carries_error_only() {
        let at = Utc.with_ymd_and_hms(2025, 7, 6, 12, 0, 0).unwrap();
        // Three 10s attempts plus two retry delays.
        let outcome =
            ProbeOutcome::failed(ErrorKind::Timeout, "operation timed out", Some(32000.0));
        let d = decide(EndpointStatus::Up, 0, &outcome, &[200]);

        let record = build_record("api", &outcome, &d, at);
        assert_eq!(record.status, CheckStatus::Down);
        assert_eq!(record.status_code, None);
        assert_eq!(record.response_time_ms, None);
        assert_eq!(record.error_message.as_deref(), Some("connection timed out"));
    }

    #[test]
    fn apply_commits_owned_endpoint() {
        let at = Utc.with_ymd_and_hms(2025, 7, 6, 12, 0, 0).unwrap();
        let endpoint = Endpoint::new("api", "API", "https://api.example.com");
        let d = decide(endpoint.last_status, endpoint.consecutive_failures, &refused(), &[200]);

        let endpoint = d.apply(endpoint, at);
        assert_eq!(endpoint.last_status, EndpointStatus::Down);
        assert_eq!(endpoint.consecutive_failures, 1);
        assert_eq!(endpoint.last_checked_at, Some(at));
    }
}
