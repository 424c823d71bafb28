//! upwatch-core — configuration and time source shared by every upwatch crate.

pub mod clock;
pub mod config;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    EndpointConfig, EngineConfig, NotifierConfig, RecipientConfig, RuleConfig, UpwatchConfig,
};
