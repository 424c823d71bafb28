//! Error types for stats queries.

use thiserror::Error;
use upwatch_state::StateError;

pub type StatsResult<T> = Result<T, StatsError>;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("unknown period: {0} (expected 1h, 6h, 24h, 7d, 30d, 90d or 1y)")]
    UnknownPeriod(String),

    #[error(transparent)]
    State(#[from] StateError),
}
