//! Incident grouping.
//!
//! An incident is a run of down checks for one endpoint where each check
//! follows the previous one by at most [`MAX_GAP_MINUTES`]. Incidents are
//! derived at read time and never stored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use upwatch_state::{CheckRecord, EndpointId};

/// Largest gap, in whole minutes, that still joins two down checks.
pub const MAX_GAP_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub endpoint_id: EndpointId,
    /// Time of the first down check.
    pub start: DateTime<Utc>,
    /// Time of the last down check.
    pub end: DateTime<Utc>,
    /// `end - start` in whole minutes.
    pub duration_minutes: i64,
    pub record_count: usize,
    /// Distinct error messages in first-seen order.
    pub error_messages: Vec<String>,
}

impl Incident {
    fn open(record: &CheckRecord) -> Self {
        let mut incident = Self {
            endpoint_id: record.endpoint_id.clone(),
            start: record.checked_at,
            end: record.checked_at,
            duration_minutes: 0,
            record_count: 1,
            error_messages: Vec::new(),
        };
        incident.note_error(record);
        incident
    }

    fn extend(&mut self, record: &CheckRecord) {
        self.end = record.checked_at;
        self.record_count += 1;
        self.note_error(record);
    }

    fn note_error(&mut self, record: &CheckRecord) {
        if let Some(message) = &record.error_message {
            if !self.error_messages.contains(message) {
                self.error_messages.push(message.clone());
            }
        }
    }

    fn close(mut self) -> Self {
        self.duration_minutes = (self.end - self.start).num_minutes();
        self
    }
}

/// Group one endpoint's time-ascending records into incidents.
///
/// Up records in the input are ignored. Empty input yields no incidents.
pub fn group_incidents(records: &[CheckRecord]) -> Vec<Incident> {
    let mut incidents = Vec::new();
    let mut current: Option<Incident> = None;

    for record in records.iter().filter(|r| !r.is_up()) {
        current = match current.take() {
            None => Some(Incident::open(record)),
            Some(mut open) => {
                let gap = (record.checked_at - open.end).num_minutes();
                if gap <= MAX_GAP_MINUTES {
                    open.extend(record);
                    Some(open)
                } else {
                    incidents.push(open.close());
                    Some(Incident::open(record))
                }
            }
        };
    }

    if let Some(open) = current {
        incidents.push(open.close());
    }
    incidents
}

/// Group records of any number of endpoints.
///
/// Each endpoint is grouped on its own records only, sorted by check time.
/// The result is ordered by endpoint id, then start time.
pub fn group_incidents_by_endpoint(records: &[CheckRecord]) -> Vec<Incident> {
    let mut by_endpoint: BTreeMap<&str, Vec<CheckRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.is_up()) {
        by_endpoint
            .entry(record.endpoint_id.as_str())
            .or_default()
            .push(record.clone());
    }

    by_endpoint
        .into_values()
        .flat_map(|mut group| {
            group.sort_by_key(|r| r.checked_at);
            group_incidents(&group)
        })
        .collect()
}
