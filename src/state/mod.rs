//! State Management Module
//!
//! Provides undo/redo history, two-tier persistence, record migration and
//! debounced autosave for dashboard layouts.

pub mod autosave;
pub mod history;
pub mod migration;
pub mod persistence;
pub mod storage;

pub use autosave::{AutosaveScheduler, Debouncer};
pub use history::{HistoryManager, DEFAULT_MAX_HISTORY_SIZE};
pub use migration::{migrate_fallback_to_durable, LegacyMigration, CURRENT_RECORD_VERSION};
pub use persistence::{LoadedLayout, PersistenceManager, StorageTier};
pub use storage::{
    DurableStore, FallbackStore, FileDurableStore, FileKeyValueStore, MemoryDurableStore,
    MemoryKeyValueStore, PersistedRecord, StoredLayout,
};
