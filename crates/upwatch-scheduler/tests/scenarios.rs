//! End-to-end check passes against an in-memory store, a scripted prober,
//! a recording notifier and a manual clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use upwatch_alert::{Notifier, NotifyError};
use upwatch_core::{EngineConfig, ManualClock};
use upwatch_health::{ErrorKind, Probe, ProbeOutcome, ProbeTarget};
use upwatch_scheduler::{PassSummary, Scheduler};
use upwatch_state::*;

// ── Test doubles ───────────────────────────────────────────────────

/// Returns queued outcomes per URL; answers 200 once a queue runs dry.
#[derive(Default)]
struct ScriptedProber {
    script: Mutex<HashMap<String, VecDeque<ProbeOutcome>>>,
    calls: AtomicUsize,
    delay: Option<StdDuration>,
}

impl ScriptedProber {
    fn push(&self, url: &str, outcome: ProbeOutcome) {
        self.script
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }
}

#[async_trait]
impl Probe for ScriptedProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .get_mut(&target.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| up())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    failing_phones: Vec<String>,
}

impl RecordingNotifier {
    fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    fn take(&self) -> Vec<String> {
        let texts = self.texts();
        self.sent.lock().unwrap().clear();
        texts
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, phone: &str, text: &str) -> Result<(), NotifyError> {
        if self.failing_phones.iter().any(|p| p == phone) {
            return Err(NotifyError::Transport("carrier unreachable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), text.to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Delegates to a real store but refuses to commit checks for one
/// endpoint, and can list an endpoint the store does not hold.
struct FailingStore {
    inner: StateStore,
    broken_endpoint: Option<String>,
    phantom: Option<Endpoint>,
}

impl FailingStore {
    fn is_broken(&self, endpoint_id: &str) -> bool {
        self.broken_endpoint.as_deref() == Some(endpoint_id)
    }
}

impl MonitorStore for FailingStore {
    fn create_check_record(&self, record: &CheckRecord) -> StateResult<()> {
        if self.is_broken(&record.endpoint_id) {
            return Err(StateError::Write("disk full".into()));
        }
        self.inner.create_check_record(record)
    }

    fn query_records(&self, query: &RecordQuery) -> StateResult<Vec<CheckRecord>> {
        self.inner.query_records(query)
    }

    fn update_endpoint_status(
        &self,
        endpoint_id: &str,
        status: EndpointStatus,
        consecutive_failures: u32,
        checked_at: DateTime<Utc>,
    ) -> StateResult<()> {
        self.inner
            .update_endpoint_status(endpoint_id, status, consecutive_failures, checked_at)
    }

    fn commit_check(
        &self,
        record: &CheckRecord,
        status: EndpointStatus,
        consecutive_failures: u32,
    ) -> StateResult<()> {
        if self.is_broken(&record.endpoint_id) {
            return Err(StateError::Write("disk full".into()));
        }
        self.inner.commit_check(record, status, consecutive_failures)
    }

    fn list_active_due_endpoints(&self, now: DateTime<Utc>) -> StateResult<Vec<Endpoint>> {
        let mut due = self.inner.list_active_due_endpoints(now)?;
        due.extend(self.phantom.clone());
        Ok(due)
    }

    fn list_endpoints(&self) -> StateResult<Vec<Endpoint>> {
        self.inner.list_endpoints()
    }

    fn list_active_rules(&self, endpoint_id: &str) -> StateResult<Vec<AlertRule>> {
        self.inner.list_active_rules(endpoint_id)
    }

    fn get_last_alert_time(&self, rule_id: &str) -> StateResult<Option<DateTime<Utc>>> {
        self.inner.get_last_alert_time(rule_id)
    }

    fn record_alert_dispatch(&self, rule_id: &str, at: DateTime<Utc>) -> StateResult<()> {
        self.inner.record_alert_dispatch(rule_id, at)
    }

    fn list_recipients(&self) -> StateResult<Vec<Recipient>> {
        self.inner.list_recipients()
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

const API_URL: &str = "http://api.test";
const WEB_URL: &str = "http://web.test";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 6, 12, 0, 0).unwrap()
}

fn up() -> ProbeOutcome {
    ProbeOutcome::responded(200, 35.0)
}

fn refused() -> ProbeOutcome {
    ProbeOutcome::failed(ErrorKind::ConnectionRefused, "tcp connect error", Some(2.0))
}

/// Every attempt ran into its 10s timeout.
fn timed_out() -> ProbeOutcome {
    ProbeOutcome::failed(ErrorKind::Timeout, "operation timed out", Some(32000.0))
}

fn recipient(id: &str, phone: &str) -> Recipient {
    Recipient {
        id: id.to_string(),
        name: id.to_string(),
        phone: Some(phone.to_string()),
        notifications_enabled: true,
    }
}

struct Harness {
    store: StateStore,
    prober: Arc<ScriptedProber>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<ManualClock>,
    scheduler: Scheduler,
}

impl Harness {
    fn build(
        store: StateStore,
        backing: Arc<dyn MonitorStore>,
        prober: ScriptedProber,
        notifier: RecordingNotifier,
        engine: EngineConfig,
    ) -> Self {
        let prober = Arc::new(prober);
        let notifier = Arc::new(notifier);
        let clock = Arc::new(ManualClock::new(start()));
        let scheduler = Scheduler::new(
            backing,
            prober.clone(),
            notifier.clone(),
            clock.clone(),
            engine,
        );
        Self {
            store,
            prober,
            notifier,
            clock,
            scheduler,
        }
    }

    fn new() -> Self {
        Self::with_engine(EngineConfig::default())
    }

    fn with_engine(engine: EngineConfig) -> Self {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_endpoint(&Endpoint::new("api", "API", API_URL))
            .unwrap();
        store.put_recipient(&recipient("ops", "+15550100")).unwrap();
        Self::build(
            store.clone(),
            Arc::new(store),
            ScriptedProber::default(),
            RecordingNotifier::default(),
            engine,
        )
    }

    async fn pass(&self) -> PassSummary {
        self.scheduler.run_pass().await.unwrap()
    }

    /// Run a pass, then move the clock to the next due time.
    async fn pass_and_advance(&self) -> PassSummary {
        let summary = self.pass().await;
        self.clock.advance(Duration::minutes(5));
        summary
    }

    fn api(&self) -> Endpoint {
        self.store.get_endpoint("api").unwrap().unwrap()
    }

    fn records(&self, endpoint_id: &str) -> Vec<CheckRecord> {
        self.store
            .query_records(
                &RecordQuery::between(start() - Duration::days(1), start() + Duration::days(1))
                    .for_endpoint(endpoint_id),
            )
            .unwrap()
    }
}

fn failures_rule(cooldown_minutes: u32) -> AlertRule {
    let mut rule = AlertRule::new(
        "api-failures",
        "api",
        RuleCondition::ConsecutiveFailures { failures: 3 },
    );
    rule.severity = Severity::High;
    rule.cooldown_minutes = cooldown_minutes;
    rule
}

fn rule_alerts(texts: &[String]) -> usize {
    texts.iter().filter(|t| t.starts_with("[HIGH]")).count()
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn failures_rule_fires_once_on_third_down() {
    let h = Harness::new();
    h.store.put_rule(&failures_rule(15)).unwrap();
    for outcome in [up(), up(), refused(), refused(), refused(), refused(), refused()] {
        h.prober.push(API_URL, outcome);
    }

    let mut rule_alerts_per_pass = Vec::new();
    for _ in 0..7 {
        h.pass_and_advance().await;
        rule_alerts_per_pass.push(rule_alerts(&h.notifier.take()));
    }

    // Third down at pass 5; passes 6 and 7 fall inside the 15 minute cooldown.
    assert_eq!(rule_alerts_per_pass, vec![0, 0, 0, 0, 1, 0, 0]);
    assert_eq!(h.api().consecutive_failures, 5);
    assert_eq!(
        h.store.get_last_alert_time("api-failures").unwrap(),
        Some(start() + Duration::minutes(20))
    );
}

#[tokio::test]
async fn rule_fires_again_after_cooldown() {
    let h = Harness::new();
    h.store.put_rule(&failures_rule(10)).unwrap();
    for _ in 0..6 {
        h.prober.push(API_URL, refused());
    }

    let mut fired = Vec::new();
    for _ in 0..6 {
        h.pass_and_advance().await;
        fired.push(rule_alerts(&h.notifier.take()));
    }
    // Threshold reached at pass 3 (t+10), then again at t+20.
    assert_eq!(fired, vec![0, 0, 1, 0, 1, 0]);
}

#[tokio::test]
async fn up_down_up_counts_and_flap_alerts() {
    let h = Harness::new();
    for outcome in [up(), refused(), up()] {
        h.prober.push(API_URL, outcome);
    }

    let mut counts = Vec::new();
    for _ in 0..3 {
        h.pass_and_advance().await;
        counts.push(h.api().consecutive_failures);
    }
    assert_eq!(counts, vec![0, 1, 0]);

    // The first check settles the unknown status, so it alerts too.
    let texts = h.notifier.texts();
    assert_eq!(texts.len(), 3);
    assert!(texts[0].starts_with("API RECOVERED\nAPI\nhttp://api.test"));
    assert!(texts[1].starts_with("API DOWN\nAPI\nhttp://api.test\nconnection refused"));
    assert!(texts[2].starts_with("API RECOVERED\nAPI\nhttp://api.test"));
    assert_eq!(h.api().last_status, EndpointStatus::Up);
}

#[tokio::test]
async fn first_check_alerts_either_way() {
    let h = Harness::new();
    h.prober.push(API_URL, refused());
    let summary = h.pass().await;

    assert_eq!(summary.down, 1);
    assert_eq!(summary.alerts_sent, 1);
    assert!(h.notifier.texts()[0].starts_with("API DOWN"));

    let h = Harness::new();
    let summary = h.pass().await;
    assert_eq!(summary.up, 1);
    assert_eq!(summary.alerts_sent, 1);
    assert!(h.notifier.texts()[0].starts_with("API RECOVERED"));

    // Steady state afterwards is quiet.
    h.clock.advance(Duration::minutes(5));
    assert_eq!(h.pass().await.alerts_sent, 0);
}

#[tokio::test]
async fn timeout_does_not_trip_response_time_rule() {
    let h = Harness::new();
    let mut rule = AlertRule::new(
        "api-latency",
        "api",
        RuleCondition::ResponseTime { threshold_ms: 5000.0 },
    );
    rule.severity = Severity::Medium;
    h.store.put_rule(&rule).unwrap();
    h.prober.push(API_URL, timed_out());

    h.pass().await;

    let records = h.records("api");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].response_time_ms, None);
    assert_eq!(
        records[0].error_message.as_deref(),
        Some("connection timed out")
    );
    assert!(!h.notifier.texts().iter().any(|t| t.starts_with("[MEDIUM]")));
    assert_eq!(h.store.get_last_alert_time("api-latency").unwrap(), None);
}

#[tokio::test]
async fn records_are_persisted_in_order() {
    let h = Harness::new();
    for outcome in [up(), refused(), ProbeOutcome::responded(503, 12.0)] {
        h.prober.push(API_URL, outcome);
    }
    for _ in 0..3 {
        h.pass_and_advance().await;
    }

    let records = h.records("api");
    let statuses: Vec<CheckStatus> = records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![CheckStatus::Up, CheckStatus::Down, CheckStatus::Down]
    );
    assert_eq!(records[1].status_code, None);
    assert_eq!(records[1].response_time_ms, None);
    assert_eq!(records[2].status_code, Some(503));
    assert_eq!(
        records[2].error_message.as_deref(),
        Some("service unavailable")
    );
    assert!(records.windows(2).all(|w| w[0].checked_at <= w[1].checked_at));
}

#[tokio::test]
async fn endpoint_not_due_is_left_alone() {
    let h = Harness::new();
    h.pass().await;
    // Only one minute later; interval is five.
    h.clock.advance(Duration::minutes(1));
    let summary = h.pass().await;

    assert_eq!(summary, PassSummary::default());
    assert_eq!(h.prober.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn maintenance_window_skips_check() {
    let h = Harness::new();
    let mut ep = h.api();
    ep.maintenance = Some(MaintenanceWindow {
        start: start() - Duration::minutes(5),
        end: start() + Duration::minutes(5),
    });
    h.store.put_endpoint(&ep).unwrap();

    let summary = h.pass().await;
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.checked, 0);
    assert_eq!(h.prober.calls.load(Ordering::SeqCst), 0);
    assert!(h.records("api").is_empty());
    assert_eq!(h.api().last_status, EndpointStatus::Unknown);

    // Checked again once the window is over.
    h.clock.advance(Duration::minutes(6));
    assert_eq!(h.pass().await.checked, 1);
}

#[tokio::test]
async fn persistence_failure_is_isolated() {
    let store = StateStore::open_in_memory().unwrap();
    store
        .put_endpoint(&Endpoint::new("api", "API", API_URL))
        .unwrap();
    store
        .put_endpoint(&Endpoint::new("web", "Web", WEB_URL))
        .unwrap();
    let backing = Arc::new(FailingStore {
        inner: store.clone(),
        broken_endpoint: Some("api".to_string()),
        phantom: None,
    });
    let h = Harness::build(
        store,
        backing,
        ScriptedProber::default(),
        RecordingNotifier::default(),
        EngineConfig::default(),
    );

    let summary = h.pass().await;
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.up, 1);

    // No partial state for the failed endpoint.
    let api = h.api();
    assert_eq!(api.last_status, EndpointStatus::Unknown);
    assert_eq!(api.last_checked_at, None);
    assert_eq!(h.records("web").len(), 1);
}

#[tokio::test]
async fn failed_state_write_leaves_no_record_behind() {
    // "ghost" is listed as due but missing from the store, so writing its
    // endpoint state fails inside the commit.
    let store = StateStore::open_in_memory().unwrap();
    store
        .put_endpoint(&Endpoint::new("web", "Web", WEB_URL))
        .unwrap();
    store.put_recipient(&recipient("ops", "+15550100")).unwrap();
    let backing = Arc::new(FailingStore {
        inner: store.clone(),
        broken_endpoint: None,
        phantom: Some(Endpoint::new("ghost", "Ghost", API_URL)),
    });
    let h = Harness::build(
        store,
        backing,
        ScriptedProber::default(),
        RecordingNotifier::default(),
        EngineConfig::default(),
    );
    for _ in 0..3 {
        h.prober.push(API_URL, refused());
    }

    for _ in 0..3 {
        let summary = h.pass_and_advance().await;
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.down, 0);
    }

    assert!(h.records("ghost").is_empty());
    assert!(h.store.get_endpoint("ghost").unwrap().is_none());
    // No down alert is ever sent for the endpoint whose state never moved.
    assert!(!h.notifier.texts().iter().any(|t| t.starts_with("Ghost DOWN")));
}

#[tokio::test]
async fn notifier_failure_does_not_block_other_recipients() {
    let store = StateStore::open_in_memory().unwrap();
    store
        .put_endpoint(&Endpoint::new("api", "API", API_URL))
        .unwrap();
    store.put_recipient(&recipient("broken", "+1000")).unwrap();
    store.put_recipient(&recipient("ops", "+15550100")).unwrap();
    let notifier = RecordingNotifier {
        failing_phones: vec!["+1000".to_string()],
        ..Default::default()
    };
    let h = Harness::build(
        store.clone(),
        Arc::new(store),
        ScriptedProber::default(),
        notifier,
        EngineConfig::default(),
    );
    h.prober.push(API_URL, refused());

    let summary = h.pass().await;
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.alerts_sent, 1);
    let sent = h.notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "+15550100");
}

#[tokio::test]
async fn dry_run_persists_but_never_notifies() {
    let h = Harness::with_engine(EngineConfig {
        dry_run: true,
        ..EngineConfig::default()
    });
    h.store.put_rule(&failures_rule(15)).unwrap();
    for _ in 0..3 {
        h.prober.push(API_URL, refused());
    }
    for _ in 0..3 {
        let summary = h.pass_and_advance().await;
        assert_eq!(summary.alerts_sent, 0);
    }

    assert!(h.notifier.texts().is_empty());
    assert_eq!(h.records("api").len(), 3);
    assert_eq!(h.api().consecutive_failures, 3);
    assert_eq!(h.store.get_last_alert_time("api-failures").unwrap(), None);
}

#[tokio::test]
async fn overlapping_passes_do_not_check_same_endpoint_twice() {
    let store = StateStore::open_in_memory().unwrap();
    store
        .put_endpoint(&Endpoint::new("api", "API", API_URL))
        .unwrap();
    let prober = ScriptedProber {
        delay: Some(StdDuration::from_millis(100)),
        ..Default::default()
    };
    let h = Harness::build(
        store.clone(),
        Arc::new(store),
        prober,
        RecordingNotifier::default(),
        EngineConfig::default(),
    );

    let (a, b) = tokio::join!(h.scheduler.run_pass(), h.scheduler.run_pass());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.checked + b.checked, 1);
    assert_eq!(a.skipped + b.skipped, 1);
    assert_eq!(h.prober.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bounded_concurrency_still_checks_everything() {
    let store = StateStore::open_in_memory().unwrap();
    for i in 0..5 {
        let id = format!("svc{i}");
        store
            .put_endpoint(&Endpoint::new(&id, &id, &format!("http://{id}.test")))
            .unwrap();
    }
    let h = Harness::build(
        store.clone(),
        Arc::new(store),
        ScriptedProber::default(),
        RecordingNotifier::default(),
        EngineConfig {
            max_concurrency: 2,
            ..EngineConfig::default()
        },
    );

    let summary = h.pass().await;
    assert_eq!(summary.checked, 5);
    assert_eq!(summary.up, 5);
    assert_eq!(h.prober.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn inactive_endpoint_is_never_checked() {
    let h = Harness::new();
    let mut ep = h.api();
    ep.active = false;
    h.store.put_endpoint(&ep).unwrap();

    assert_eq!(h.pass().await, PassSummary::default());
}
