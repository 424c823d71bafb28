//! Store-backed reports.
//!
//! Thin wrappers that read a window of records through [`MonitorStore`]
//! and hand them to the pure aggregation functions.

use chrono::{DateTime, Utc};
use tracing::debug;

use upwatch_state::{CheckStatus, MonitorStore, RecordQuery};

use crate::availability::{
    chart_series, compute_global_stats, compute_stats, response_time_series, AvailabilityStats,
    ChartPoint, GlobalStats, ResponseTimePoint,
};
use crate::error::StatsResult;
use crate::incidents::{group_incidents_by_endpoint, Incident};
use crate::period::Period;

pub fn endpoint_stats(
    store: &dyn MonitorStore,
    endpoint_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> StatsResult<AvailabilityStats> {
    let records = store.query_records(&RecordQuery::between(start, end).for_endpoint(endpoint_id))?;
    debug!(endpoint = %endpoint_id, records = records.len(), "computing endpoint stats");
    Ok(compute_stats(&records))
}

pub fn global_stats(
    store: &dyn MonitorStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> StatsResult<GlobalStats> {
    let endpoints = store.list_endpoints()?;
    let records = store.query_records(&RecordQuery::between(start, end))?;
    debug!(endpoints = endpoints.len(), records = records.len(), "computing global stats");
    Ok(compute_global_stats(&endpoints, &records))
}

/// Incidents in the window, for one endpoint or all of them.
pub fn incidents(
    store: &dyn MonitorStore,
    endpoint_id: Option<&str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> StatsResult<Vec<Incident>> {
    let mut query = RecordQuery::between(start, end).with_status(CheckStatus::Down);
    if let Some(id) = endpoint_id {
        query = query.for_endpoint(id);
    }
    let records = store.query_records(&query)?;
    Ok(group_incidents_by_endpoint(&records))
}

/// Bucketed uptime for the trailing `period`.
pub fn chart(
    store: &dyn MonitorStore,
    endpoint_id: &str,
    period: Period,
    now: DateTime<Utc>,
) -> StatsResult<Vec<ChartPoint>> {
    let (start, end) = period.range(now);
    let records = store.query_records(&RecordQuery::between(start, end).for_endpoint(endpoint_id))?;
    Ok(chart_series(&records, period.bucket()))
}

pub fn response_times(
    store: &dyn MonitorStore,
    endpoint_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> StatsResult<Vec<ResponseTimePoint>> {
    let records = store.query_records(
        &RecordQuery::between(start, end)
            .for_endpoint(endpoint_id)
            .with_status(CheckStatus::Up),
    )?;
    Ok(response_time_series(&records))
}
