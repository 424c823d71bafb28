//! Scheduler — one check pass over every due endpoint.
//!
//! For each active, due endpoint outside its maintenance window the pass
//! probes, decides the new status, persists the check record and endpoint
//! state, sends the status-change alert and runs the endpoint's alert
//! rules. Endpoints are checked concurrently up to `max_concurrency`;
//! a failure on one endpoint is logged and counted, never fatal to the
//! pass.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use upwatch_alert::{
    check, cooldown_elapsed, deliver_to_all, down_message, recovery_message, rule_message,
    Notifier,
};
use upwatch_core::{Clock, EngineConfig};
use upwatch_health::{build_record, decide, log_transition, Probe, ProbeTarget, StatusDecision};
use upwatch_state::*;

use crate::error::{SchedulerError, SchedulerResult};

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub checked: usize,
    pub up: usize,
    pub down: usize,
    /// In maintenance, or already being checked by an overlapping pass.
    pub skipped: usize,
    pub alerts_sent: usize,
    pub errors: usize,
}

impl PassSummary {
    fn record(&mut self, report: &EndpointReport) {
        match report.status {
            Some(CheckStatus::Up) => {
                self.checked += 1;
                self.up += 1;
            }
            Some(CheckStatus::Down) => {
                self.checked += 1;
                self.down += 1;
            }
            None => {}
        }
        self.alerts_sent += report.alerts_sent;
        if report.failed {
            self.errors += 1;
        }
    }
}

/// What happened to one endpoint during a pass.
#[derive(Debug, Default)]
struct EndpointReport {
    /// Set once the check record is persisted.
    status: Option<CheckStatus>,
    alerts_sent: usize,
    failed: bool,
}

/// Marks an endpoint as being checked until dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<EndpointId>>>,
    endpoint_id: EndpointId,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<Mutex<HashSet<EndpointId>>>, endpoint_id: &str) -> Option<Self> {
        let mut set = in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !set.insert(endpoint_id.to_string()) {
            return None;
        }
        Some(Self {
            in_flight: in_flight.clone(),
            endpoint_id: endpoint_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.endpoint_id);
    }
}

/// Runs check passes. Cheap to clone; clones share the in-flight set.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn MonitorStore>,
    prober: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    engine: EngineConfig,
    in_flight: Arc<Mutex<HashSet<EndpointId>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        prober: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        engine: EngineConfig,
    ) -> Self {
        Self {
            store,
            prober,
            notifier,
            clock,
            engine,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Check every due endpoint once.
    ///
    /// Fails only if the due endpoints cannot be listed.
    pub async fn run_pass(&self) -> SchedulerResult<PassSummary> {
        let now = self.clock.now();
        let due = self.store.list_active_due_endpoints(now)?;
        let mut summary = PassSummary::default();

        let permits = Arc::new(Semaphore::new(self.engine.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for endpoint in due {
            if endpoint.in_maintenance(now) {
                debug!(endpoint = %endpoint.id, "in maintenance window, skipping");
                summary.skipped += 1;
                continue;
            }
            let Some(guard) = InFlightGuard::acquire(&self.in_flight, &endpoint.id) else {
                debug!(endpoint = %endpoint.id, "check already in flight, skipping");
                summary.skipped += 1;
                continue;
            };

            let this = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let _guard = guard;
                this.check_endpoint(endpoint).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => summary.record(&report),
                Err(e) => {
                    let e = SchedulerError::Task(e.to_string());
                    error!(error = %e, "endpoint check task died");
                    summary.errors += 1;
                }
            }
        }

        info!(
            checked = summary.checked,
            up = summary.up,
            down = summary.down,
            skipped = summary.skipped,
            alerts = summary.alerts_sent,
            errors = summary.errors,
            dry_run = self.engine.dry_run,
            "check pass complete"
        );
        Ok(summary)
    }

    /// Run passes until `shutdown` flips.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "scheduler started");
        loop {
            if let Err(e) = self.run_pass().await {
                error!(error = %e, "check pass failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }

    async fn check_endpoint(&self, endpoint: Endpoint) -> EndpointReport {
        let mut report = EndpointReport::default();
        if let Err(e) = self.try_check_endpoint(&endpoint, &mut report).await {
            error!(endpoint = %endpoint.id, error = %e, "endpoint check abandoned");
            report.failed = true;
        }
        report
    }

    async fn try_check_endpoint(
        &self,
        endpoint: &Endpoint,
        report: &mut EndpointReport,
    ) -> SchedulerResult<()> {
        let outcome = self.prober.probe(&ProbeTarget::for_endpoint(endpoint)).await;
        let decision = decide(
            endpoint.last_status,
            endpoint.consecutive_failures,
            &outcome,
            &endpoint.expected_status_codes,
        );
        let checked_at = self.clock.now();

        let record = build_record(&endpoint.id, &outcome, &decision, checked_at);
        self.store
            .commit_check(&record, decision.new_status, decision.new_failure_count)?;
        report.status = Some(record.status);
        log_transition(endpoint, &decision);
        let committed = decision.apply(endpoint.clone(), checked_at);

        if let Some(text) = status_change_text(endpoint, &decision, &record) {
            if self.dispatch(&endpoint.id, &text).await? {
                report.alerts_sent += 1;
            }
        }

        for rule in self.store.list_active_rules(&endpoint.id)? {
            let history = match rule.condition.history_window() {
                Some(window) => {
                    let start = checked_at
                        .checked_sub_signed(window)
                        .unwrap_or(DateTime::<Utc>::MIN_UTC);
                    self.store.query_records(
                        &RecordQuery::between(start, checked_at).for_endpoint(&endpoint.id),
                    )?
                }
                None => Vec::new(),
            };
            let Some(trigger) = check(&rule, &committed, &record, &history, checked_at) else {
                continue;
            };

            let last = self.store.get_last_alert_time(&rule.id)?;
            if !cooldown_elapsed(last, rule.cooldown(), checked_at) {
                debug!(endpoint = %endpoint.id, rule = %rule.id, "rule triggered inside cooldown");
                continue;
            }

            let text = rule_message(&rule, &committed, &trigger.observed, checked_at);
            if self.dispatch(&endpoint.id, &text).await? {
                self.store.record_alert_dispatch(&rule.id, checked_at)?;
                report.alerts_sent += 1;
            }
        }

        Ok(())
    }

    /// Send an alert to every recipient. Returns false in dry-run mode.
    async fn dispatch(&self, endpoint_id: &str, text: &str) -> SchedulerResult<bool> {
        if self.engine.dry_run {
            info!(endpoint = %endpoint_id, %text, "dry run: alert not sent");
            return Ok(false);
        }
        let recipients = self.store.list_recipients()?;
        let delivery = deliver_to_all(self.notifier.as_ref(), &recipients, text).await;
        if delivery.failed > 0 {
            warn!(
                endpoint = %endpoint_id,
                delivered = delivery.delivered,
                failed = delivery.failed,
                "alert partially delivered"
            );
        }
        Ok(true)
    }
}

/// The status-change alert for a transition, if any.
fn status_change_text(
    prior: &Endpoint,
    decision: &StatusDecision,
    record: &CheckRecord,
) -> Option<String> {
    if !decision.transitioned {
        return None;
    }
    match decision.new_status {
        EndpointStatus::Down => Some(down_message(
            prior,
            record.error_message.as_deref(),
            record.checked_at,
        )),
        EndpointStatus::Up => Some(recovery_message(
            prior,
            record.response_time_ms,
            record.checked_at,
        )),
        EndpointStatus::Unknown => None,
    }
}
