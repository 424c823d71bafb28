//! upwatch-state — embedded state store for upwatch.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for endpoints, check records, alert rules, recipients and the
//! last-dispatch time of each rule.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Check records are keyed `{endpoint_id}:{millis}:{record_id}` so a range
//! scan over one endpoint returns its history in time order.
//!
//! The engine talks to storage only through the [`MonitorStore`] trait;
//! [`StateStore`] is the redb implementation. `StateStore` is `Clone` +
//! `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod seed;
pub mod storage;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use seed::{apply_config, default_rules_for, SeedSummary};
pub use storage::{MonitorStore, RecordQuery};
pub use store::StateStore;
pub use types::*;
