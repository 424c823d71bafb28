//! upwatch-health — HTTP probing and status tracking for upwatch.
//!
//! # Architecture
//!
//! ```text
//! Endpoint ──► ProbeTarget ──► Probe::probe() ──► ProbeOutcome
//!                                                   │
//!        prior status + failure count ──► decide() ─┴─► StatusDecision
//!                                                        │
//!                                                        └─► build_record() ──► CheckRecord
//! ```
//!
//! The prober retries transport failures a bounded number of times and
//! never returns an error; the tracker is a pure function whose output the
//! scheduler persists.

pub mod checker;
pub mod tracker;

pub use checker::{
    classify_message, ErrorKind, HttpProber, Probe, ProbeOutcome, ProbeTarget,
};
pub use tracker::{build_record, decide, log_transition, status_description, DownReason, StatusDecision};
