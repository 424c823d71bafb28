//! upwatch-alert — deciding when to notify, and notifying.
//!
//! Two independent paths feed notifications:
//!
//! - **Status change**: the scheduler sends [`down_message`] or
//!   [`recovery_message`] whenever an endpoint flips between up and down.
//! - **Rules**: [`check`] judges each active [`AlertRule`] against the
//!   fresh record; [`cooldown_elapsed`] gates dispatch per rule.
//!
//! Delivery goes through the [`Notifier`] trait. [`deliver_to_all`]
//! isolates per-recipient failures.
//!
//! [`AlertRule`]: upwatch_state::AlertRule

pub mod cooldown;
pub mod error;
pub mod message;
pub mod notify;
pub mod rules;

pub use cooldown::cooldown_elapsed;
pub use error::NotifyError;
pub use message::{down_message, recovery_message, rule_message};
pub use notify::{
    deliver_to_all, from_config, DeliveryReport, LogNotifier, Notifier, SmsGatewayNotifier,
};
pub use rules::{check, evaluate, Trigger};
