//! upwatch-scheduler — the check pass.
//!
//! # Architecture
//!
//! ```text
//! Scheduler::run_pass()
//!   ├── MonitorStore::list_active_due_endpoints(now)
//!   ├── skip: maintenance window, in-flight from an overlapping pass
//!   └── per endpoint (JoinSet, bounded by a Semaphore)
//!       ├── Probe::probe()            → ProbeOutcome
//!       ├── decide()                  → StatusDecision
//!       ├── commit_check (record + endpoint state, one transaction)
//!       ├── status-change alert       (down / recovery)
//!       └── active rules → check() → cooldown gate → Notifier
//! ```
//!
//! `run()` repeats the pass on an interval until shutdown. A single pass
//! can equally be driven by an external timer.

pub mod error;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{PassSummary, Scheduler};
