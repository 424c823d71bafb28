//! Availability aggregation over a window of check records.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use upwatch_state::{CheckRecord, Endpoint, EndpointStatus};

use crate::incidents::group_incidents_by_endpoint;
use crate::period::Bucket;

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 100 for no checks, otherwise `success / total * 100` rounded to 2 places.
pub fn uptime_percentage(success: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    round2(success as f64 / total as f64 * 100.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityStats {
    pub uptime_pct: f64,
    pub total_checks: usize,
    pub success_count: usize,
    pub fail_count: usize,
    /// Over up checks with a positive response time.
    pub avg_response_time_ms: Option<f64>,
    pub max_response_time_ms: Option<f64>,
    pub total_downtime_minutes: i64,
    pub longest_outage_minutes: i64,
    pub incident_count: usize,
}

/// Aggregate a window of records.
///
/// The caller filters the window; records from several endpoints are
/// grouped into incidents per endpoint.
pub fn compute_stats(records: &[CheckRecord]) -> AvailabilityStats {
    let total_checks = records.len();
    let success_count = records.iter().filter(|r| r.is_up()).count();

    let timings: Vec<f64> = records
        .iter()
        .filter(|r| r.is_up())
        .filter_map(|r| r.response_time_ms)
        .filter(|ms| *ms > 0.0)
        .collect();
    let avg_response_time_ms = if timings.is_empty() {
        None
    } else {
        Some(round2(timings.iter().sum::<f64>() / timings.len() as f64))
    };
    let max_response_time_ms = timings.iter().copied().reduce(f64::max);

    let incidents = group_incidents_by_endpoint(records);

    AvailabilityStats {
        uptime_pct: uptime_percentage(success_count, total_checks),
        total_checks,
        success_count,
        fail_count: total_checks - success_count,
        avg_response_time_ms,
        max_response_time_ms,
        total_downtime_minutes: incidents.iter().map(|i| i.duration_minutes).sum(),
        longest_outage_minutes: incidents
            .iter()
            .map(|i| i.duration_minutes)
            .max()
            .unwrap_or(0),
        incident_count: incidents.len(),
    }
}

/// Stats across every endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalStats {
    pub total_endpoints: usize,
    pub active_endpoints: usize,
    pub up_endpoints: usize,
    pub down_endpoints: usize,
    pub stats: AvailabilityStats,
}

pub fn compute_global_stats(endpoints: &[Endpoint], records: &[CheckRecord]) -> GlobalStats {
    let count = |status: EndpointStatus| endpoints.iter().filter(|e| e.last_status == status).count();
    GlobalStats {
        total_endpoints: endpoints.len(),
        active_endpoints: endpoints.iter().filter(|e| e.active).count(),
        up_endpoints: count(EndpointStatus::Up),
        down_endpoints: count(EndpointStatus::Down),
        stats: compute_stats(records),
    }
}

/// One chart bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub bucket_start: DateTime<Utc>,
    pub label: String,
    pub total_checks: usize,
    pub uptime_pct: f64,
    pub avg_response_time_ms: Option<f64>,
}

/// Uptime and average response time per bucket, oldest first.
pub fn chart_series(records: &[CheckRecord], bucket: Bucket) -> Vec<ChartPoint> {
    let mut groups: BTreeMap<DateTime<Utc>, Vec<&CheckRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(bucket.truncate(record.checked_at))
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .map(|(bucket_start, group)| {
            let up: Vec<&&CheckRecord> = group.iter().filter(|r| r.is_up()).collect();
            let timings: Vec<f64> = up.iter().filter_map(|r| r.response_time_ms).collect();
            ChartPoint {
                bucket_start,
                label: bucket.label(bucket_start),
                total_checks: group.len(),
                uptime_pct: uptime_percentage(up.len(), group.len()),
                avg_response_time_ms: mean(&timings),
            }
        })
        .collect()
}

/// Daily response time of successful checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTimePoint {
    pub date: NaiveDate,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub min_ms: f64,
}

pub fn response_time_series(records: &[CheckRecord]) -> Vec<ResponseTimePoint> {
    let mut days: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_up()) {
        if let Some(ms) = record.response_time_ms {
            days.entry(record.checked_at.date_naive()).or_default().push(ms);
        }
    }

    days.into_iter()
        .filter_map(|(date, timings)| {
            Some(ResponseTimePoint {
                date,
                avg_ms: mean(&timings)?,
                max_ms: round2(timings.iter().copied().reduce(f64::max)?),
                min_ms: round2(timings.iter().copied().reduce(f64::min)?),
            })
        })
        .collect()
}

/// Minutes since the current outage began, if the endpoint is down.
///
/// The outage starts at the earliest down record of the trailing run of
/// down records in `records` (time-ascending).
pub fn current_outage_minutes(
    endpoint: &Endpoint,
    records: &[CheckRecord],
    now: DateTime<Utc>,
) -> Option<i64> {
    if endpoint.last_status != EndpointStatus::Down {
        return None;
    }
    let started = records
        .iter()
        .rev()
        .take_while(|r| !r.is_up())
        .last()?
        .checked_at;
    Some((now - started).num_minutes().max(0))
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(round2(values.iter().sum::<f64>() / values.len() as f64))
}
