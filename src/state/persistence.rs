//! Persistence Manager
//!
//! Saves and loads the dashboard layout through two storage tiers. The
//! durable store is preferred; the fallback store is written only when the
//! durable store is unavailable. Loading migrates a legacy fallback record
//! into durable storage the first time it is seen.

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};

use crate::error::Result;
use crate::layout::Layout;
use crate::state::migration::{migrate_fallback_to_durable, parse_legacy_record, LegacyMigration};
use crate::state::storage::{DurableStore, FallbackStore, PersistedRecord, StoredLayout};

/// Default durable record key.
pub const DEFAULT_LAYOUT_KEY: &str = "default";

/// Default fallback-store key (also the legacy record key).
pub const DEFAULT_LEGACY_KEY: &str = "dashboard-layout";

/// Which storage tier served a save or load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTier {
    Durable,
    Fallback,
}

impl std::fmt::Display for StorageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageTier::Durable => write!(f, "durable"),
            StorageTier::Fallback => write!(f, "fallback"),
        }
    }
}

/// A layout returned by [`PersistenceManager::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedLayout {
    pub layout: Layout,

    /// Tier the layout was read from.
    pub tier: StorageTier,

    /// True if the layout was imported from the legacy fallback record.
    pub migrated: bool,

    /// When the layout was saved, if the record says so.
    pub saved_at: Option<DateTime<Utc>>,
}

/// Two-tier layout persistence.
pub struct PersistenceManager {
    durable: Box<dyn DurableStore>,
    fallback: Box<dyn FallbackStore>,

    /// Durable record key.
    layout_key: String,

    /// Fallback-store key.
    legacy_key: String,

    /// Timestamp of the last successful save.
    last_saved: Option<DateTime<Utc>>,
}

impl PersistenceManager {
    /// Create a manager over the given tiers with the default keys.
    pub fn new(durable: Box<dyn DurableStore>, fallback: Box<dyn FallbackStore>) -> Self {
        Self::with_keys(durable, fallback, DEFAULT_LAYOUT_KEY, DEFAULT_LEGACY_KEY)
    }

    /// Create a manager with custom record keys.
    pub fn with_keys(
        durable: Box<dyn DurableStore>,
        fallback: Box<dyn FallbackStore>,
        layout_key: impl Into<String>,
        legacy_key: impl Into<String>,
    ) -> Self {
        Self {
            durable,
            fallback,
            layout_key: layout_key.into(),
            legacy_key: legacy_key.into(),
            last_saved: None,
        }
    }

    /// Get the durable record key.
    pub fn layout_key(&self) -> &str {
        &self.layout_key
    }

    /// Timestamp of the last successful save.
    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    /// Whether saves currently go to the durable tier.
    pub fn active_tier(&self) -> StorageTier {
        if self.durable.is_available() {
            StorageTier::Durable
        } else {
            StorageTier::Fallback
        }
    }

    /// Save a layout to exactly one tier.
    ///
    /// A durable write failure is returned as-is; it is not redirected to
    /// the fallback tier.
    pub fn save(&mut self, layout: &Layout) -> Result<StorageTier> {
        let now = Utc::now();
        let tier = self.active_tier();

        match tier {
            StorageTier::Durable => {
                let record = StoredLayout::with_timestamp(
                    self.layout_key.clone(),
                    layout.clone(),
                    now.timestamp_millis(),
                )?;
                self.durable.put(&record)?;
            }
            StorageTier::Fallback => {
                let record = PersistedRecord {
                    layout: layout.clone(),
                    timestamp: now.timestamp_millis(),
                };
                let content = serde_json::to_string(&record)?;
                self.fallback.set_item(&self.legacy_key, &content)?;
            }
        }

        self.last_saved = Some(now);
        debug!("Saved layout ({} items) to {} store", layout.len(), tier);
        Ok(tier)
    }

    /// Load the saved layout, if any.
    pub fn load(&mut self) -> Result<Option<LoadedLayout>> {
        if !self.durable.is_available() {
            debug!("Durable store unavailable, reading fallback store");
            return self.load_fallback();
        }

        match self.durable.get(&self.layout_key) {
            Ok(Some(record)) => Ok(Some(LoadedLayout {
                layout: record.layout,
                tier: StorageTier::Durable,
                migrated: false,
                saved_at: from_millis(record.timestamp),
            })),
            Ok(None) => self.migrate_legacy(),
            Err(e) => {
                warn!("Durable layout read failed, reading fallback store: {}", e);
                self.load_fallback()
            }
        }
    }

    /// All durable records, newest first. Empty when durable storage is
    /// unavailable.
    pub fn list_records(&self) -> Result<Vec<StoredLayout>> {
        if !self.durable.is_available() {
            return Ok(Vec::new());
        }
        self.durable.list()
    }

    /// Durable records saved at or after `since` (epoch millis), newest first.
    pub fn list_records_since(&self, since: i64) -> Result<Vec<StoredLayout>> {
        if !self.durable.is_available() {
            return Ok(Vec::new());
        }
        self.durable.list_since(since)
    }

    /// Delete every durable record. Returns how many were removed.
    pub fn clear_records(&mut self) -> Result<usize> {
        if !self.durable.is_available() {
            return Ok(0);
        }
        let count = self.durable.list()?.len();
        self.durable.clear()?;
        info!("Cleared {} durable layout records", count);
        Ok(count)
    }

    /// Delete the saved layout from whichever tier holds it.
    pub fn delete(&mut self) -> Result<()> {
        if self.durable.is_available() {
            self.durable.delete(&self.layout_key)?;
        }
        self.fallback.remove_item(&self.legacy_key)
    }

    fn migrate_legacy(&mut self) -> Result<Option<LoadedLayout>> {
        let outcome = migrate_fallback_to_durable(
            self.durable.as_mut(),
            self.fallback.as_mut(),
            &self.legacy_key,
            &self.layout_key,
        )?;

        match outcome {
            LegacyMigration::NothingToMigrate => Ok(None),
            LegacyMigration::Migrated(layout) => Ok(Some(LoadedLayout {
                layout,
                tier: StorageTier::Durable,
                migrated: true,
                saved_at: None,
            })),
            LegacyMigration::ImportFailed { layout, .. } => {
                info!("Serving legacy layout from fallback store until migration succeeds");
                Ok(Some(LoadedLayout {
                    layout,
                    tier: StorageTier::Fallback,
                    migrated: false,
                    saved_at: None,
                }))
            }
        }
    }

    fn load_fallback(&self) -> Result<Option<LoadedLayout>> {
        let Some(raw) = self.fallback.get_item(&self.legacy_key)? else {
            return Ok(None);
        };

        let record = parse_legacy_record(&raw)?;
        Ok(Some(LoadedLayout {
            layout: record.layout,
            tier: StorageTier::Fallback,
            migrated: false,
            saved_at: from_millis(record.timestamp),
        }))
    }
}

fn from_millis(timestamp: i64) -> Option<DateTime<Utc>> {
    if timestamp <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(timestamp).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutItem;
    use crate::state::storage::{FileDurableStore, MemoryDurableStore, MemoryKeyValueStore};

    fn manager(durable: &MemoryDurableStore, fallback: &MemoryKeyValueStore) -> PersistenceManager {
        PersistenceManager::new(Box::new(durable.clone()), Box::new(fallback.clone()))
    }

    fn sample_layout() -> Layout {
        vec![LayoutItem::new("forecast", "chart", 0, 0, 8, 4)]
    }

    #[test]
    fn test_save_prefers_durable_only() {
        let durable = MemoryDurableStore::new();
        let fallback = MemoryKeyValueStore::new();
        let mut persistence = manager(&durable, &fallback);

        let tier = persistence.save(&sample_layout()).unwrap();

        assert_eq!(tier, StorageTier::Durable);
        assert_eq!(durable.write_count(), 1);
        assert_eq!(fallback.write_count(), 0);
        assert!(persistence.last_saved().is_some());
    }

    #[test]
    fn test_save_failure_not_redirected() {
        let durable = MemoryDurableStore::new();
        durable.set_fail_writes(true);
        let fallback = MemoryKeyValueStore::new();
        let mut persistence = manager(&durable, &fallback);

        assert!(persistence.save(&sample_layout()).is_err());
        assert_eq!(fallback.write_count(), 0);
        assert!(persistence.last_saved().is_none());
    }

    #[test]
    fn test_load_empty_returns_none() {
        let mut persistence = manager(&MemoryDurableStore::new(), &MemoryKeyValueStore::new());
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn test_load_reports_tier_and_time() {
        let durable = MemoryDurableStore::new();
        let fallback = MemoryKeyValueStore::new();
        let mut persistence = manager(&durable, &fallback);
        persistence.save(&sample_layout()).unwrap();

        let loaded = persistence.load().unwrap().unwrap();
        assert_eq!(loaded.tier, StorageTier::Durable);
        assert!(!loaded.migrated);
        assert!(loaded.saved_at.is_some());
    }

    #[test]
    fn test_runtime_durable_failure_reads_fallback() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("default.layout.json"), "{ truncated").unwrap();

        let mut fallback = MemoryKeyValueStore::new();
        let legacy = serde_json::to_string(&PersistedRecord::new(sample_layout())).unwrap();
        fallback.set_item(DEFAULT_LEGACY_KEY, &legacy).unwrap();

        let mut persistence = PersistenceManager::new(
            Box::new(FileDurableStore::open(temp_dir.path())),
            Box::new(fallback.clone()),
        );

        let loaded = persistence.load().unwrap().unwrap();
        assert_eq!(loaded.tier, StorageTier::Fallback);
        assert_eq!(loaded.layout, sample_layout());
        assert!(fallback.contains_key(DEFAULT_LEGACY_KEY));
    }

    #[test]
    fn test_delete_clears_both_tiers() {
        let durable = MemoryDurableStore::new();
        let fallback = MemoryKeyValueStore::new();
        let mut persistence = manager(&durable, &fallback);
        persistence.save(&sample_layout()).unwrap();

        persistence.delete().unwrap();
        assert!(persistence.load().unwrap().is_none());
        assert!(persistence.list_records().unwrap().is_empty());
    }

    #[test]
    fn test_tampered_durable_record_reads_fallback() {
        let durable = MemoryDurableStore::new();
        let mut record = StoredLayout::new(DEFAULT_LAYOUT_KEY, sample_layout()).unwrap();
        record.checksum = Some("0000".to_string());
        durable.insert_raw(record);

        let mut fallback = MemoryKeyValueStore::new();
        let saved = vec![LayoutItem::new("backup", "table", 0, 0, 4, 2)];
        let legacy = serde_json::to_string(&PersistedRecord::new(saved.clone())).unwrap();
        fallback.set_item(DEFAULT_LEGACY_KEY, &legacy).unwrap();

        let loaded = manager(&durable, &fallback).load().unwrap().unwrap();
        assert_eq!(loaded.tier, StorageTier::Fallback);
        assert_eq!(loaded.layout, saved);
    }

    #[test]
    fn test_clear_records_and_list_since() {
        let durable = MemoryDurableStore::new();
        durable.insert_raw(StoredLayout::with_timestamp("old", sample_layout(), 1_000).unwrap());
        durable.insert_raw(StoredLayout::with_timestamp("new", sample_layout(), 5_000).unwrap());
        let mut persistence = manager(&durable, &MemoryKeyValueStore::new());

        let recent = persistence.list_records_since(2_000).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "new");

        assert_eq!(persistence.clear_records().unwrap(), 2);
        assert!(persistence.list_records().unwrap().is_empty());
    }

    #[test]
    fn test_clear_records_without_durable_tier() {
        let mut persistence =
            manager(&MemoryDurableStore::unavailable(), &MemoryKeyValueStore::new());
        assert_eq!(persistence.clear_records().unwrap(), 0);
        assert!(persistence.list_records_since(0).unwrap().is_empty());
    }

    #[test]
    fn test_from_millis() {
        assert!(from_millis(0).is_none());
        assert_eq!(from_millis(1_000).unwrap().timestamp(), 1);
    }
}
