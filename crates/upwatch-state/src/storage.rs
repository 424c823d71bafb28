//! The storage contract consumed by the monitoring engine.
//!
//! The scheduler, the alert path and the reports only ever see a
//! `MonitorStore`, so tests can wrap or replace the redb store.

use chrono::{DateTime, Utc};

use crate::error::StateResult;
use crate::types::*;

/// Filter for a time-bounded read of check records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    /// Restrict to one endpoint; `None` reads every endpoint.
    pub endpoint_id: Option<EndpointId>,
    pub status: Option<CheckStatus>,
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Inclusive upper bound.
    pub end: DateTime<Utc>,
}

impl RecordQuery {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            endpoint_id: None,
            status: None,
            start,
            end,
        }
    }

    pub fn for_endpoint(mut self, endpoint_id: &str) -> Self {
        self.endpoint_id = Some(endpoint_id.to_string());
        self
    }

    pub fn with_status(mut self, status: CheckStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, record: &CheckRecord) -> bool {
        self.endpoint_id
            .as_deref()
            .is_none_or(|id| id == record.endpoint_id)
            && self.status.is_none_or(|s| s == record.status)
            && self.start <= record.checked_at
            && record.checked_at <= self.end
    }
}

/// Persistence operations the engine needs.
pub trait MonitorStore: Send + Sync {
    /// Append one check record.
    fn create_check_record(&self, record: &CheckRecord) -> StateResult<()>;

    /// Records matching the query, ordered by check time ascending.
    fn query_records(&self, query: &RecordQuery) -> StateResult<Vec<CheckRecord>>;

    /// Commit the status, failure counter and check time of an endpoint.
    fn update_endpoint_status(
        &self,
        endpoint_id: &str,
        status: EndpointStatus,
        consecutive_failures: u32,
        checked_at: DateTime<Utc>,
    ) -> StateResult<()>;

    /// Store a check record and the endpoint state it produced in one
    /// transaction. Either both are written or neither is.
    fn commit_check(
        &self,
        record: &CheckRecord,
        status: EndpointStatus,
        consecutive_failures: u32,
    ) -> StateResult<()>;

    /// Active endpoints whose next check time has elapsed or that were
    /// never checked.
    fn list_active_due_endpoints(&self, now: DateTime<Utc>) -> StateResult<Vec<Endpoint>>;

    fn list_endpoints(&self) -> StateResult<Vec<Endpoint>>;

    fn list_active_rules(&self, endpoint_id: &str) -> StateResult<Vec<AlertRule>>;

    fn get_last_alert_time(&self, rule_id: &str) -> StateResult<Option<DateTime<Utc>>>;

    fn record_alert_dispatch(&self, rule_id: &str, at: DateTime<Utc>) -> StateResult<()>;

    fn list_recipients(&self) -> StateResult<Vec<Recipient>>;
}
