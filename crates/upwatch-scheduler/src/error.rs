//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during a check pass.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("state store error: {0}")]
    State(#[from] upwatch_state::StateError),

    #[error("check task failed: {0}")]
    Task(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
