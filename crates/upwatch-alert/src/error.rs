//! Notification error types.

use thiserror::Error;

/// Failure to deliver one notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(String),

    #[error("gateway rejected message: {0}")]
    Rejected(String),

    #[error("notifier setup failed: {0}")]
    Setup(String),
}
