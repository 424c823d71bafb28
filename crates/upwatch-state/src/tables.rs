//! redb table definitions for the upwatch state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Endpoints keyed by `{endpoint_id}`.
pub const ENDPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("endpoints");

/// Check records keyed by `{endpoint_id}:{millis:020}:{record_id}`.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("check_records");

/// Alert rules keyed by `{endpoint_id}:{rule_id}`.
pub const RULES: TableDefinition<&str, &[u8]> = TableDefinition::new("alert_rules");

/// Recipients keyed by `{recipient_id}`.
pub const RECIPIENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("recipients");

/// Last alert dispatch time keyed by `{rule_id}`.
pub const DISPATCHES: TableDefinition<&str, &[u8]> = TableDefinition::new("alert_dispatches");
