//! Record migration support.
//!
//! Two kinds of migration happen here:
//! - schema upgrades of durable records, applied step by step through a
//!   version registry when a record is read, and
//! - the one-time import of a legacy fallback-store record into the durable
//!   store.

use std::collections::HashMap;

use log::{info, warn};
use serde_json::Value;

use crate::error::{LayoutError, Result};
use crate::layout::Layout;
use crate::state::storage::{layout_checksum, DurableStore, FallbackStore, PersistedRecord, StoredLayout};

/// Current schema version of durable records.
pub const CURRENT_RECORD_VERSION: u64 = 1;

/// Takes a record JSON value and returns it upgraded by one version.
type MigrationFn = fn(Value) -> Result<Value>;

/// Maps a source version to the function upgrading it to the next version.
fn get_migration_registry() -> HashMap<u64, MigrationFn> {
    let mut registry: HashMap<u64, MigrationFn> = HashMap::new();

    registry.insert(0, migrate_v0_to_v1);

    registry
}

/// Parse a durable record, upgrading it to [`CURRENT_RECORD_VERSION`].
///
/// `key` fills in the record id when an old record lacks one.
///
/// # Errors
/// Returns `LayoutError::UnsupportedRecordVersion` for records written by a
/// newer schema, and `LayoutError::CorruptRecord` if the upgraded value does
/// not parse.
pub fn upgrade_stored_record(mut data: Value, key: &str) -> Result<StoredLayout> {
    let mut version = data.get("version").and_then(Value::as_u64).unwrap_or(0);

    if version > CURRENT_RECORD_VERSION {
        return Err(LayoutError::UnsupportedRecordVersion { version });
    }

    if version < CURRENT_RECORD_VERSION {
        let registry = get_migration_registry();
        while version < CURRENT_RECORD_VERSION {
            let migration = registry
                .get(&version)
                .ok_or_else(|| LayoutError::MigrationError {
                    from: version,
                    to: version + 1,
                    reason: "no migration registered".to_string(),
                })?;
            data = migration(data)?;
            version += 1;
        }
        info!("Upgraded layout record '{}' to v{}", key, CURRENT_RECORD_VERSION);
    }

    if let Value::Object(map) = &mut data {
        map.entry("id").or_insert_with(|| Value::String(key.to_string()));
    }

    serde_json::from_value(data).map_err(|e| LayoutError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// v0 records are `{id?, layout, timestamp?}` with no version or checksum.
fn migrate_v0_to_v1(mut data: Value) -> Result<Value> {
    let map = data.as_object_mut().ok_or_else(|| LayoutError::MigrationError {
        from: 0,
        to: 1,
        reason: "record is not a JSON object".to_string(),
    })?;

    let layout_value = map.get("layout").cloned().ok_or_else(|| LayoutError::MigrationError {
        from: 0,
        to: 1,
        reason: "record has no layout".to_string(),
    })?;
    let layout: Layout = serde_json::from_value(layout_value).map_err(|e| LayoutError::MigrationError {
        from: 0,
        to: 1,
        reason: e.to_string(),
    })?;

    map.entry("timestamp").or_insert(Value::from(0));
    map.insert("version".to_string(), Value::from(1));
    map.insert("checksum".to_string(), Value::String(layout_checksum(&layout)?));

    Ok(data)
}

/// Parse a fallback-store record.
pub fn parse_legacy_record(raw: &str) -> Result<PersistedRecord> {
    serde_json::from_str(raw).map_err(|e| LayoutError::CorruptRecord {
        key: "legacy".to_string(),
        reason: e.to_string(),
    })
}

/// Outcome of [`migrate_fallback_to_durable`].
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyMigration {
    /// No legacy record existed.
    NothingToMigrate,

    /// The legacy record was imported and removed from the fallback store.
    Migrated(Layout),

    /// The legacy record was read but could not be imported; it stays in the
    /// fallback store so the next load retries.
    ImportFailed { layout: Layout, reason: String },
}

/// Import the legacy fallback record under `legacy_key` into the durable
/// store under `durable_key`.
///
/// The legacy key is removed only after the durable write succeeds, so a
/// record is migrated exactly once and never silently discarded.
pub fn migrate_fallback_to_durable(
    durable: &mut dyn DurableStore,
    fallback: &mut dyn FallbackStore,
    legacy_key: &str,
    durable_key: &str,
) -> Result<LegacyMigration> {
    let Some(raw) = fallback.get_item(legacy_key)? else {
        return Ok(LegacyMigration::NothingToMigrate);
    };

    let legacy = parse_legacy_record(&raw)?;
    let record = StoredLayout::with_timestamp(durable_key, legacy.layout.clone(), legacy.timestamp)?;

    if let Err(e) = durable.put(&record) {
        warn!("Legacy layout migration failed, keeping fallback record: {}", e);
        return Ok(LegacyMigration::ImportFailed {
            layout: legacy.layout,
            reason: e.to_string(),
        });
    }

    if let Err(e) = fallback.remove_item(legacy_key) {
        warn!("Migrated legacy layout but could not remove '{}': {}", legacy_key, e);
    }

    info!(
        "Migrated legacy layout '{}' ({} items) into durable record '{}'",
        legacy_key,
        record.layout.len(),
        durable_key
    );
    Ok(LegacyMigration::Migrated(legacy.layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutItem;
    use crate::state::storage::{MemoryDurableStore, MemoryKeyValueStore};
    use serde_json::json;

    #[test]
    fn test_upgrade_v0_record() {
        let data = json!({
            "layout": [{"id": "a", "x": 0, "y": 0, "w": 2, "h": 2, "component": "chart"}],
            "timestamp": 1700000000000i64
        });

        let record = upgrade_stored_record(data, "default").unwrap();

        assert_eq!(record.id, "default");
        assert_eq!(record.version, CURRENT_RECORD_VERSION);
        assert_eq!(record.timestamp, 1700000000000);
        assert!(record.checksum.is_some());
        record.verify().unwrap();
    }

    #[test]
    fn test_current_record_passes_through() {
        let original = StoredLayout::with_timestamp("default", vec![LayoutItem::new("a", "c", 0, 0, 1, 1)], 5).unwrap();
        let value = serde_json::to_value(&original).unwrap();

        assert_eq!(upgrade_stored_record(value, "default").unwrap(), original);
    }

    #[test]
    fn test_future_version_rejected() {
        let data = json!({"id": "default", "layout": [], "timestamp": 0, "version": 9});
        let err = upgrade_stored_record(data, "default").unwrap_err();
        assert!(matches!(err, LayoutError::UnsupportedRecordVersion { version: 9 }));
    }

    #[test]
    fn test_v0_without_layout_fails() {
        let err = upgrade_stored_record(json!({"timestamp": 1}), "default").unwrap_err();
        assert!(matches!(err, LayoutError::MigrationError { from: 0, to: 1, .. }));
    }

    #[test]
    fn test_migrate_nothing() {
        let mut durable = MemoryDurableStore::new();
        let mut fallback = MemoryKeyValueStore::new();

        let outcome =
            migrate_fallback_to_durable(&mut durable, &mut fallback, "dashboard-layout", "default").unwrap();
        assert_eq!(outcome, LegacyMigration::NothingToMigrate);
    }

    #[test]
    fn test_migrate_moves_record_once() {
        let mut durable = MemoryDurableStore::new();
        let mut fallback = MemoryKeyValueStore::new();
        fallback
            .set_item(
                "dashboard-layout",
                r#"{"layout":[{"id":"a","x":1,"y":1,"w":2,"h":2,"component":"metric"}],"timestamp":42}"#,
            )
            .unwrap();

        let outcome =
            migrate_fallback_to_durable(&mut durable, &mut fallback, "dashboard-layout", "default").unwrap();

        let layout = match outcome {
            LegacyMigration::Migrated(layout) => layout,
            other => panic!("expected migration, got {:?}", other),
        };
        assert_eq!(layout[0].component, "metric");
        assert!(!fallback.contains_key("dashboard-layout"));

        let stored = durable.get("default").unwrap().unwrap();
        assert_eq!(stored.timestamp, 42);
        assert_eq!(stored.layout, layout);

        let again =
            migrate_fallback_to_durable(&mut durable, &mut fallback, "dashboard-layout", "default").unwrap();
        assert_eq!(again, LegacyMigration::NothingToMigrate);
    }

    #[test]
    fn test_failed_import_keeps_legacy_record() {
        let mut durable = MemoryDurableStore::new();
        durable.set_fail_writes(true);
        let mut fallback = MemoryKeyValueStore::new();
        fallback.set_item("dashboard-layout", r#"{"layout":[]}"#).unwrap();

        let outcome =
            migrate_fallback_to_durable(&mut durable, &mut fallback, "dashboard-layout", "default").unwrap();

        assert!(matches!(outcome, LegacyMigration::ImportFailed { .. }));
        assert!(fallback.contains_key("dashboard-layout"));
    }

    #[test]
    fn test_parse_legacy_record_rejects_garbage() {
        assert!(parse_legacy_record("not json").is_err());
        assert_eq!(parse_legacy_record(r#"{"layout":[]}"#).unwrap().timestamp, 0);
    }
}
