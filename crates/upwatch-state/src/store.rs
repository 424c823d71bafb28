//! StateStore — redb-backed state persistence for upwatch.
//!
//! Provides typed operations over endpoints, check records, alert rules,
//! recipients and alert dispatch times. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::storage::{MonitorStore, RecordQuery};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.open_table(RULES).map_err(map_err!(Table))?;
        txn.open_table(RECIPIENTS).map_err(map_err!(Table))?;
        txn.open_table(DISPATCHES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON helpers ───────────────────────────────────────

    fn put_json<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_json<T: DeserializeOwned>(&self, def: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let item: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(item);
        }
        Ok(results)
    }

    /// Values whose keys fall in `[lower, upper)`.
    fn range_json<T: DeserializeOwned>(
        &self,
        def: JsonTable,
        lower: &str,
        upper: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(lower..upper).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let item: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(item);
        }
        Ok(results)
    }

    // ── Endpoints ──────────────────────────────────────────────────

    /// Insert or update an endpoint.
    pub fn put_endpoint(&self, endpoint: &Endpoint) -> StateResult<()> {
        self.put_json(ENDPOINTS, &endpoint.id, endpoint)?;
        debug!(endpoint = %endpoint.id, "endpoint stored");
        Ok(())
    }

    pub fn get_endpoint(&self, endpoint_id: &str) -> StateResult<Option<Endpoint>> {
        self.get_json(ENDPOINTS, endpoint_id)
    }

    // ── Alert rules ────────────────────────────────────────────────

    /// Insert or update an alert rule.
    pub fn put_rule(&self, rule: &AlertRule) -> StateResult<()> {
        self.put_json(RULES, &rule.table_key(), rule)
    }

    /// All rules of an endpoint, active or not.
    pub fn list_rules_for_endpoint(&self, endpoint_id: &str) -> StateResult<Vec<AlertRule>> {
        // ';' sorts right after ':', so this covers exactly `{endpoint_id}:*`.
        let lower = format!("{endpoint_id}:");
        let upper = format!("{endpoint_id};");
        self.range_json(RULES, &lower, &upper)
    }

    // ── Recipients ─────────────────────────────────────────────────

    pub fn put_recipient(&self, recipient: &Recipient) -> StateResult<()> {
        self.put_json(RECIPIENTS, &recipient.id, recipient)
    }

    // ── Check records ──────────────────────────────────────────────

    fn records_for_endpoint(
        &self,
        endpoint_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StateResult<Vec<CheckRecord>> {
        let lower = format!("{endpoint_id}:{}", time_key(start));
        let upper = format!("{endpoint_id}:{}", time_key(end + Duration::milliseconds(1)));
        self.range_json(RECORDS, &lower, &upper)
    }
}

/// Rewrite an endpoint's live state inside `txn`.
fn write_endpoint_status(
    txn: &WriteTransaction,
    endpoint_id: &str,
    status: EndpointStatus,
    consecutive_failures: u32,
    checked_at: DateTime<Utc>,
) -> StateResult<()> {
    let mut table = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
    let mut endpoint: Endpoint = match table.get(endpoint_id).map_err(map_err!(Read))? {
        Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
        None => return Err(StateError::NotFound(format!("endpoint {endpoint_id}"))),
    };
    endpoint.last_status = status;
    endpoint.consecutive_failures = consecutive_failures;
    endpoint.last_checked_at = Some(checked_at);
    let bytes = serde_json::to_vec(&endpoint).map_err(map_err!(Serialize))?;
    table
        .insert(endpoint_id, bytes.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

impl MonitorStore for StateStore {
    fn create_check_record(&self, record: &CheckRecord) -> StateResult<()> {
        self.put_json(RECORDS, &record.table_key(), record)?;
        debug!(endpoint = %record.endpoint_id, status = %record.status, "check record stored");
        Ok(())
    }

    fn query_records(&self, query: &RecordQuery) -> StateResult<Vec<CheckRecord>> {
        let mut records: Vec<CheckRecord> = match &query.endpoint_id {
            Some(id) => self.records_for_endpoint(id, query.start, query.end)?,
            None => self.list_json(RECORDS)?,
        };
        records.retain(|r| query.matches(r));
        // Full scans come back grouped by endpoint; restore global time order.
        records.sort_by_key(|r| r.checked_at);
        Ok(records)
    }

    fn update_endpoint_status(
        &self,
        endpoint_id: &str,
        status: EndpointStatus,
        consecutive_failures: u32,
        checked_at: DateTime<Utc>,
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        write_endpoint_status(&txn, endpoint_id, status, consecutive_failures, checked_at)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(endpoint = %endpoint_id, %status, consecutive_failures, "endpoint status updated");
        Ok(())
    }

    fn commit_check(
        &self,
        record: &CheckRecord,
        status: EndpointStatus,
        consecutive_failures: u32,
    ) -> StateResult<()> {
        let bytes = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        write_endpoint_status(
            &txn,
            &record.endpoint_id,
            status,
            consecutive_failures,
            record.checked_at,
        )?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            table
                .insert(record.table_key().as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            endpoint = %record.endpoint_id,
            %status,
            consecutive_failures,
            "check committed"
        );
        Ok(())
    }

    fn list_active_due_endpoints(&self, now: DateTime<Utc>) -> StateResult<Vec<Endpoint>> {
        let endpoints: Vec<Endpoint> = self.list_json(ENDPOINTS)?;
        Ok(endpoints.into_iter().filter(|e| e.is_due(now)).collect())
    }

    fn list_endpoints(&self) -> StateResult<Vec<Endpoint>> {
        self.list_json(ENDPOINTS)
    }

    fn list_active_rules(&self, endpoint_id: &str) -> StateResult<Vec<AlertRule>> {
        let rules = self.list_rules_for_endpoint(endpoint_id)?;
        Ok(rules.into_iter().filter(|r| r.active).collect())
    }

    fn get_last_alert_time(&self, rule_id: &str) -> StateResult<Option<DateTime<Utc>>> {
        self.get_json(DISPATCHES, rule_id)
    }

    fn record_alert_dispatch(&self, rule_id: &str, at: DateTime<Utc>) -> StateResult<()> {
        self.put_json(DISPATCHES, rule_id, &at)?;
        debug!(rule = %rule_id, %at, "alert dispatch recorded");
        Ok(())
    }

    fn list_recipients(&self) -> StateResult<Vec<Recipient>> {
        self.list_json(RECIPIENTS)
    }
}
