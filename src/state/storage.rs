//! Layout Storage Tiers
//!
//! Two storage tiers back the persistence manager:
//! - a durable, record-oriented store ([`DurableStore`]) that keeps one
//!   [`StoredLayout`] per key, and
//! - a simple string key-value store ([`FallbackStore`]) that is always
//!   available.
//!
//! File-backed and in-memory implementations of both are provided.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{LayoutError, Result};
use crate::layout::Layout;
use crate::state::migration::{upgrade_stored_record, CURRENT_RECORD_VERSION};

/// Extension for durable record files.
const RECORD_EXTENSION: &str = ".layout.json";

/// Record written to the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLayout {
    /// Record key (one dashboard per key).
    pub id: String,

    /// The saved layout.
    pub layout: Layout,

    /// Save time in epoch milliseconds.
    pub timestamp: i64,

    /// Record schema version.
    pub version: u64,

    /// SHA-256 of the serialized layout, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl StoredLayout {
    /// Create a record stamped with the current time and checksum.
    pub fn new(id: impl Into<String>, layout: Layout) -> Result<Self> {
        Self::with_timestamp(id, layout, Utc::now().timestamp_millis())
    }

    /// Create a record with an explicit timestamp.
    pub fn with_timestamp(id: impl Into<String>, layout: Layout, timestamp: i64) -> Result<Self> {
        let checksum = layout_checksum(&layout)?;
        Ok(Self {
            id: id.into(),
            layout,
            timestamp,
            version: CURRENT_RECORD_VERSION,
            checksum: Some(checksum),
        })
    }

    /// Check the stored checksum against the layout.
    ///
    /// Records without a checksum are accepted.
    pub fn verify(&self) -> Result<()> {
        let Some(expected) = &self.checksum else {
            return Ok(());
        };

        let actual = layout_checksum(&self.layout)?;
        if &actual != expected {
            return Err(LayoutError::CorruptRecord {
                key: self.id.clone(),
                reason: format!("checksum mismatch (expected {}, found {})", expected, actual),
            });
        }
        Ok(())
    }
}

/// Record written to the fallback store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// The saved layout.
    pub layout: Layout,

    /// Save time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl PersistedRecord {
    /// Create a record stamped with the current time.
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Compute the hex SHA-256 of a layout's JSON form.
pub fn layout_checksum(layout: &Layout) -> Result<String> {
    let bytes = serde_json::to_vec(layout)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Preferred, record-oriented storage tier.
pub trait DurableStore {
    /// Whether this tier can be used in the current environment.
    fn is_available(&self) -> bool;

    /// Read the record for `key`.
    fn get(&self, key: &str) -> Result<Option<StoredLayout>>;

    /// Insert or replace a record.
    fn put(&mut self, record: &StoredLayout) -> Result<()>;

    /// Delete the record for `key`; missing keys are not an error.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// All records, newest first.
    fn list(&self) -> Result<Vec<StoredLayout>>;

    /// Records saved at or after `since` (epoch millis), newest first.
    fn list_since(&self, since: i64) -> Result<Vec<StoredLayout>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| record.timestamp >= since)
            .collect())
    }

    /// Delete every record.
    fn clear(&mut self) -> Result<()>;
}

/// Always-available string key-value tier.
pub trait FallbackStore {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&mut self, key: &str) -> Result<()>;
}

/// Durable store keeping one JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileDurableStore {
    dir: PathBuf,
    available: bool,
}

impl FileDurableStore {
    /// Open (and create if needed) a record directory.
    ///
    /// If the directory cannot be created the store reports itself
    /// unavailable instead of failing.
    pub fn open(dir: &Path) -> Self {
        let available = match fs::create_dir_all(dir) {
            Ok(()) => true,
            Err(e) => {
                warn!("Durable layout store unavailable at {}: {}", dir.display(), e);
                false
            }
        };
        Self {
            dir: dir.to_path_buf(),
            available,
        }
    }

    /// Get the record directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", sanitize_key(key), RECORD_EXTENSION))
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(LayoutError::DurableStoreUnavailable {
                reason: format!("cannot use {}", self.dir.display()),
            })
        }
    }

    fn read_record(&self, path: &Path, key: &str) -> Result<StoredLayout> {
        let content = fs::read_to_string(path).map_err(|e| LayoutError::RecordReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| LayoutError::CorruptRecord {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let record = upgrade_stored_record(value, key)?;
        record.verify()?;
        Ok(record)
    }
}

impl DurableStore for FileDurableStore {
    fn is_available(&self) -> bool {
        self.available
    }

    fn get(&self, key: &str) -> Result<Option<StoredLayout>> {
        self.ensure_available()?;

        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }

        self.read_record(&path, key).map(Some)
    }

    fn put(&mut self, record: &StoredLayout) -> Result<()> {
        self.ensure_available()?;

        let path = self.record_path(&record.id);
        let content = serde_json::to_string_pretty(record)?;
        write_atomic(&path, &content)?;

        debug!("Wrote layout record '{}' to {}", record.id, path.display());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.ensure_available()?;

        let path = self.record_path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| LayoutError::RecordWriteError { path, source: e })?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<StoredLayout>> {
        self.ensure_available()?;

        let mut records = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(key) = name.strip_suffix(RECORD_EXTENSION) else {
                continue;
            };

            match self.read_record(entry.path(), key) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable layout record {}: {}", name, e),
            }
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    fn clear(&mut self) -> Result<()> {
        self.ensure_available()?;

        let paths: Vec<PathBuf> = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(RECORD_EXTENSION))
            .map(|entry| entry.into_path())
            .collect();

        for path in paths {
            fs::remove_file(&path).map_err(|e| LayoutError::RecordWriteError { path, source: e })?;
        }
        debug!("Cleared layout records in {}", self.dir.display());
        Ok(())
    }
}

/// Fallback store keeping every key in one JSON object file.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    path: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Get the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_entries(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| LayoutError::RecordReadError {
            path: self.path.clone(),
            source: e,
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    fn save_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| LayoutError::DirectoryCreateError {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let content = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.path, &content)
    }
}

impl FallbackStore for FileKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load_entries()?.remove(key))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load_entries()?;
        entries.insert(key.to_string(), value.to_string());
        self.save_entries(&entries)
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        let mut entries = self.load_entries()?;
        if entries.remove(key).is_some() {
            self.save_entries(&entries)?;
        }
        Ok(())
    }
}

/// In-memory durable store.
///
/// Clones share the same records, so a test can keep a handle while the
/// persistence manager owns another. Availability and write failures can be
/// toggled to simulate hostile environments.
#[derive(Debug, Clone, Default)]
pub struct MemoryDurableStore {
    records: Rc<RefCell<BTreeMap<String, StoredLayout>>>,
    unavailable: Rc<Cell<bool>>,
    fail_writes: Rc<Cell<bool>>,
    writes: Rc<Cell<usize>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that reports itself unavailable.
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.set(!available);
    }

    /// Make every subsequent `put` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    /// Insert a record as-is, bypassing availability checks and checksums.
    pub fn insert_raw(&self, record: StoredLayout) {
        self.records.borrow_mut().insert(record.id.clone(), record);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.get() {
            Err(LayoutError::DurableStoreUnavailable {
                reason: "in-memory store disabled".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl DurableStore for MemoryDurableStore {
    fn is_available(&self) -> bool {
        !self.unavailable.get()
    }

    fn get(&self, key: &str) -> Result<Option<StoredLayout>> {
        self.ensure_available()?;
        let record = self.records.borrow().get(key).cloned();
        if let Some(record) = &record {
            record.verify()?;
        }
        Ok(record)
    }

    fn put(&mut self, record: &StoredLayout) -> Result<()> {
        self.ensure_available()?;
        if self.fail_writes.get() {
            return Err(LayoutError::RecordWriteError {
                path: PathBuf::from(format!("memory://{}", record.id)),
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated write failure"),
            });
        }

        self.records
            .borrow_mut()
            .insert(record.id.clone(), record.clone());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.ensure_available()?;
        self.records.borrow_mut().remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<StoredLayout>> {
        self.ensure_available()?;
        let mut records: Vec<StoredLayout> = self.records.borrow().values().cloned().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    fn clear(&mut self) -> Result<()> {
        self.ensure_available()?;
        self.records.borrow_mut().clear();
        Ok(())
    }
}

/// In-memory fallback store with shared clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
    writes: Rc<Cell<usize>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_item` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }
}

impl FallbackStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Write through a temp file and rename so readers never see a partial file.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content).map_err(|e| LayoutError::RecordWriteError {
        path: tmp_path.clone(),
        source: e,
    })?;
    fs::rename(&tmp_path, path).map_err(|e| LayoutError::RecordWriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Keys become file names; keep them to a safe character set.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
