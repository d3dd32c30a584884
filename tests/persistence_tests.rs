//! Persistence Tests
//!
//! Two-tier save/load, legacy migration and autosave against on-disk and
//! in-memory stores.

use std::fs;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use gridsync::clock::ManualClock;
use gridsync::layout::{Layout, LayoutItem};
use gridsync::state::{
    DurableStore, FallbackStore, FileDurableStore, FileKeyValueStore, MemoryDurableStore,
    MemoryKeyValueStore, PersistedRecord, PersistenceManager, StorageTier,
};
use gridsync::{DashboardStore, EngineConfig};

fn sample_layout() -> Layout {
    vec![
        LayoutItem::new("revenue", "line-chart", 0, 0, 6, 4)
            .with_props(serde_json::json!({"title": "Revenue", "range": "30d"})),
        LayoutItem::new("orders", "table", 6, 0, 6, 4),
        LayoutItem::new("logo", "image", 0, 4, 2, 2).pinned(),
    ]
}

fn file_manager(dir: &TempDir) -> PersistenceManager {
    PersistenceManager::new(
        Box::new(FileDurableStore::open(&dir.path().join("records"))),
        Box::new(FileKeyValueStore::new(&dir.path().join("fallback.json"))),
    )
}

fn legacy_json(layout: &Layout) -> String {
    serde_json::to_string(&PersistedRecord {
        layout: layout.clone(),
        timestamp: 1_700_000_000_000,
    })
    .unwrap()
}

// === Round trips ===

#[test]
fn test_save_then_load_on_disk() {
    let dir = TempDir::new().unwrap();
    let layout = sample_layout();

    assert_eq!(file_manager(&dir).save(&layout).unwrap(), StorageTier::Durable);

    // A fresh manager sees the same record.
    let loaded = file_manager(&dir).load().unwrap().unwrap();
    assert_eq!(loaded.layout, layout);
    assert_eq!(loaded.tier, StorageTier::Durable);
    assert!(!loaded.migrated);
    assert!(loaded.saved_at.is_some());
}

#[test]
fn test_unavailable_durable_round_trips_via_fallback() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocked");
    fs::write(&blocker, "not a directory").unwrap();

    let durable = FileDurableStore::open(&blocker.join("records"));
    assert!(!durable.is_available());

    let fallback_path = dir.path().join("fallback.json");
    let mut manager = PersistenceManager::new(
        Box::new(durable.clone()),
        Box::new(FileKeyValueStore::new(&fallback_path)),
    );

    assert_eq!(manager.save(&sample_layout()).unwrap(), StorageTier::Fallback);
    assert!(fallback_path.exists());

    let mut reopened =
        PersistenceManager::new(Box::new(durable), Box::new(FileKeyValueStore::new(&fallback_path)));
    let loaded = reopened.load().unwrap().unwrap();
    assert_eq!(loaded.layout, sample_layout());
    assert_eq!(loaded.tier, StorageTier::Fallback);
}

#[test]
fn test_save_writes_exactly_one_tier() {
    let durable = MemoryDurableStore::new();
    let fallback = MemoryKeyValueStore::new();
    let mut manager = PersistenceManager::new(Box::new(durable.clone()), Box::new(fallback.clone()));

    manager.save(&sample_layout()).unwrap();

    assert_eq!(durable.write_count(), 1);
    assert_eq!(fallback.write_count(), 0);
}

#[test]
fn test_durable_write_failure_is_reported() {
    let durable = MemoryDurableStore::new();
    durable.set_fail_writes(true);
    let fallback = MemoryKeyValueStore::new();
    let mut manager = PersistenceManager::new(Box::new(durable), Box::new(fallback.clone()));

    assert!(manager.save(&sample_layout()).is_err());
    assert_eq!(fallback.write_count(), 0);
    assert!(manager.last_saved().is_none());
}

// === Migration ===

#[test]
fn test_legacy_record_migrated_exactly_once() {
    let dir = TempDir::new().unwrap();
    let fallback_path = dir.path().join("fallback.json");
    let mut fallback = FileKeyValueStore::new(&fallback_path);
    fallback
        .set_item("dashboard-layout", &legacy_json(&sample_layout()))
        .unwrap();

    let first = file_manager(&dir).load().unwrap().unwrap();
    assert!(first.migrated);
    assert_eq!(first.layout, sample_layout());
    assert_eq!(fallback.get_item("dashboard-layout").unwrap(), None);

    let durable = FileDurableStore::open(&dir.path().join("records"));
    let record = durable.get("default").unwrap().unwrap();
    assert_eq!(record.layout, sample_layout());
    assert_eq!(record.timestamp, 1_700_000_000_000);

    let second = file_manager(&dir).load().unwrap().unwrap();
    assert!(!second.migrated);
    assert_eq!(second.tier, StorageTier::Durable);
    assert_eq!(second.layout, sample_layout());
}

#[test]
fn test_failed_import_keeps_legacy_record() {
    let durable = MemoryDurableStore::new();
    durable.set_fail_writes(true);
    let mut fallback = MemoryKeyValueStore::new();
    fallback
        .set_item("dashboard-layout", &legacy_json(&sample_layout()))
        .unwrap();
    let mut manager = PersistenceManager::new(Box::new(durable.clone()), Box::new(fallback.clone()));

    let loaded = manager.load().unwrap().unwrap();
    assert_eq!(loaded.tier, StorageTier::Fallback);
    assert!(!loaded.migrated);
    assert!(fallback.contains_key("dashboard-layout"));

    // Once writes work again the next load completes the migration.
    durable.set_fail_writes(false);
    let loaded = manager.load().unwrap().unwrap();
    assert!(loaded.migrated);
    assert!(!fallback.contains_key("dashboard-layout"));
}

#[test]
fn test_nothing_saved_loads_none() {
    let dir = TempDir::new().unwrap();
    assert!(file_manager(&dir).load().unwrap().is_none());
}

#[test]
fn test_list_records_newest_first() {
    let dir = TempDir::new().unwrap();
    let records_dir = dir.path().join("records");

    let mut old = PersistenceManager::with_keys(
        Box::new(FileDurableStore::open(&records_dir)),
        Box::new(MemoryKeyValueStore::new()),
        "old",
        "dashboard-layout",
    );
    old.save(&vec![LayoutItem::new("a", "chart", 0, 0, 1, 1)]).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    let mut new = PersistenceManager::with_keys(
        Box::new(FileDurableStore::open(&records_dir)),
        Box::new(MemoryKeyValueStore::new()),
        "new",
        "dashboard-layout",
    );
    new.save(&sample_layout()).unwrap();

    let ids: Vec<String> = new
        .list_records()
        .unwrap()
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
}

// === Autosave through the store ===

#[test]
fn test_autosave_debounces_bursts() {
    let durable = MemoryDurableStore::new();
    let persistence =
        PersistenceManager::new(Box::new(durable.clone()), Box::new(MemoryKeyValueStore::new()));
    let clock = ManualClock::new();
    let mut store = DashboardStore::new(
        &EngineConfig::default(),
        persistence,
        None,
        Box::new(clock.clone()),
    );

    for (i, item) in sample_layout().into_iter().enumerate() {
        store.add_item(item);
        clock.advance(Duration::from_millis(400));
        store.poll();
        assert_eq!(durable.write_count(), 0, "saved too early after edit {}", i);
    }

    clock.advance(Duration::from_millis(600));
    store.poll();

    assert_eq!(durable.write_count(), 1);
    assert!(!store.is_dirty());
    assert_eq!(durable.get("default").unwrap().unwrap().layout, sample_layout());
}

#[test]
fn test_save_failure_keeps_editing() {
    let durable = MemoryDurableStore::new();
    durable.set_fail_writes(true);
    let persistence =
        PersistenceManager::new(Box::new(durable.clone()), Box::new(MemoryKeyValueStore::new()));
    let clock = ManualClock::new();
    let mut store = DashboardStore::new(
        &EngineConfig::default(),
        persistence,
        None,
        Box::new(clock.clone()),
    );

    store.add_item(LayoutItem::new("a", "chart", 0, 0, 2, 2));
    clock.advance(Duration::from_secs(1));
    store.poll();

    assert!(store.is_dirty());
    assert!(store.error().unwrap().contains("Failed to save layout"));

    assert!(store.add_item(LayoutItem::new("b", "chart", 2, 0, 2, 2)));
    durable.set_fail_writes(false);
    clock.advance(Duration::from_secs(1));
    store.poll();

    assert!(!store.is_dirty());
    assert_eq!(durable.get("default").unwrap().unwrap().layout.len(), 2);
}

#[test]
fn test_shutdown_flushes_pending_save() {
    let durable = MemoryDurableStore::new();
    let persistence =
        PersistenceManager::new(Box::new(durable.clone()), Box::new(MemoryKeyValueStore::new()));
    let clock = ManualClock::new();
    let mut store = DashboardStore::new(
        &EngineConfig::default(),
        persistence,
        None,
        Box::new(clock),
    );

    store.add_item(LayoutItem::new("a", "chart", 0, 0, 2, 2));
    store.shutdown();

    assert_eq!(durable.write_count(), 1);
    assert!(!store.is_dirty());
}
