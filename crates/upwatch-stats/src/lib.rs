//! upwatch-stats — incidents and availability for upwatch.
//!
//! Everything here is derived from stored check records at read time.
//! [`group_incidents`] folds runs of down checks into incidents;
//! [`compute_stats`] turns a window of records into uptime, response time
//! and downtime figures. The [`report`] module reads windows through the
//! storage trait.

pub mod availability;
pub mod error;
pub mod incidents;
pub mod period;
pub mod report;

pub use availability::{
    chart_series, compute_global_stats, compute_stats, current_outage_minutes,
    response_time_series, round2, uptime_percentage, AvailabilityStats, ChartPoint, GlobalStats,
    ResponseTimePoint,
};
pub use error::{StatsError, StatsResult};
pub use incidents::{group_incidents, group_incidents_by_endpoint, Incident, MAX_GAP_MINUTES};
pub use period::{Bucket, Period};
