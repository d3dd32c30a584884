//! Dashboard store.
//!
//! [`DashboardStore`] is the single entry point for a UI. It owns the
//! current layout through its [`HistoryManager`], saves it through a
//! [`PersistenceManager`] on a debounced schedule, and keeps it in step with
//! the remote authority through an optional [`SyncEngine`].
//!
//! Actions never return errors. Failures land in [`DashboardStore::error`]
//! and, for sync, in [`DashboardStore::sync_status`].

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::LayoutError;
use crate::layout::{Layout, LayoutItem, LayoutItemPatch};
use crate::state::{
    AutosaveScheduler, FileDurableStore, FileKeyValueStore, HistoryManager, PersistenceManager,
    StorageTier,
};
use crate::sync::{
    ConnectionState, HttpFallbackSync, SyncEngine, SyncEvent, SyncStatus, WsConnector,
};

/// Layout state, history, persistence and sync behind one façade.
pub struct DashboardStore {
    history: HistoryManager,
    persistence: PersistenceManager,
    autosave: AutosaveScheduler,
    sync: Option<SyncEngine>,
    clock: Box<dyn Clock>,
    error: Option<String>,
    last_saved: Option<DateTime<Utc>>,
}

impl DashboardStore {
    /// Assemble a store from its parts.
    pub fn new(
        config: &EngineConfig,
        persistence: PersistenceManager,
        sync: Option<SyncEngine>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            history: HistoryManager::new(config.max_history_size),
            persistence,
            autosave: AutosaveScheduler::new(config.autosave_delay()),
            sync,
            clock,
            error: None,
            last_saved: None,
        }
    }

    /// A store backed by files under `config.storage_dir`, syncing over
    /// WebSocket and HTTP when `config.sync.enabled` is set.
    pub fn open(config: &EngineConfig) -> Self {
        let persistence = PersistenceManager::with_keys(
            Box::new(FileDurableStore::open(&config.durable_dir())),
            Box::new(FileKeyValueStore::new(&config.fallback_path())),
            config.layout_key.clone(),
            config.legacy_key.clone(),
        );

        let sync = if config.sync.enabled {
            let fallback = HttpFallbackSync::new(config.sync.http_url.clone())
                .with_timeout(config.sync.http_timeout());
            Some(SyncEngine::new(
                config.sync.engine_config(),
                Box::new(WsConnector::new().with_timeout(config.sync.connect_timeout())),
                Box::new(fallback),
            ))
        } else {
            None
        };

        Self::new(config, persistence, sync, Box::new(SystemClock))
    }

    // ------------------------------------------------------------------
    // Read model
    // ------------------------------------------------------------------

    pub fn layout(&self) -> &Layout {
        self.history.current()
    }

    /// Whether there are edits not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync
            .as_ref()
            .map_or(SyncStatus::Idle, |sync| sync.status())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.sync
            .as_ref()
            .map_or(ConnectionState::Disconnected, |sync| sync.connection_state())
    }

    /// Message from the most recent failure, until cleared.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn persistence(&self) -> &PersistenceManager {
        &self.persistence
    }

    pub fn autosave(&self) -> &AutosaveScheduler {
        &self.autosave
    }

    pub fn sync_engine(&self) -> Option<&SyncEngine> {
        self.sync.as_ref()
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let autosave = self
            .autosave
            .time_until_save(self.clock.now())
            .map(|left| self.clock.now() + left);
        let sync = self.sync.as_ref().and_then(|sync| sync.next_deadline());
        autosave.into_iter().chain(sync).min()
    }

    // ------------------------------------------------------------------
    // Layout actions
    // ------------------------------------------------------------------

    /// Replace the whole layout.
    pub fn update_layout(&mut self, layout: Layout) {
        self.history.update(layout);
        self.after_mutation();
    }

    /// Append a widget. Returns false if the id is already taken.
    pub fn add_item(&mut self, item: LayoutItem) -> bool {
        match self.history.add(item) {
            Ok(_) => {
                self.after_mutation();
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Remove a widget. Returns false if no widget has that id.
    pub fn remove_item(&mut self, id: &str) -> bool {
        if !self.history.remove(id) {
            debug!("remove_item: no item '{}'", id);
            return false;
        }
        self.after_mutation();
        true
    }

    /// Patch a widget. Returns false if no widget has that id.
    pub fn update_item(&mut self, id: &str, patch: &LayoutItemPatch) -> bool {
        if !self.history.update_item(id, patch) {
            debug!("update_item: no item '{}'", id);
            return false;
        }
        self.after_mutation();
        true
    }

    pub fn undo(&mut self) -> bool {
        if self.history.undo().is_none() {
            return false;
        }
        self.after_mutation();
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.history.redo().is_none() {
            return false;
        }
        self.after_mutation();
        true
    }

    /// Drop every past and future snapshot, keeping the current layout.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Mark the current layout as saved without writing it.
    pub fn mark_clean(&mut self) {
        self.autosave.mark_clean();
    }

    /// Return to an empty layout with a fresh history.
    pub fn reset(&mut self) {
        self.history.reset(Layout::new());
        self.autosave.mark_clean();
        self.error = None;
        self.notify_sync();
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Save the current layout now. Returns false on failure.
    pub fn save(&mut self) -> bool {
        match self.persistence.save(self.history.current()) {
            Ok(tier) => {
                self.autosave.record_success();
                self.last_saved = self.persistence.last_saved();
                if tier == StorageTier::Fallback {
                    debug!("Layout saved to fallback store");
                }
                true
            }
            Err(e) => {
                warn!("Failed to save layout: {}", e);
                self.autosave.record_failure(e.to_string());
                self.error = Some(format!("Failed to save layout: {}", e));
                false
            }
        }
    }

    /// Replace the layout with the saved one and start a fresh history.
    ///
    /// Returns false if nothing was saved or loading failed.
    pub fn load(&mut self) -> bool {
        match self.persistence.load() {
            Ok(Some(loaded)) => {
                info!(
                    "Loaded layout with {} items from {} store{}",
                    loaded.layout.len(),
                    loaded.tier,
                    if loaded.migrated { " (migrated)" } else { "" }
                );
                self.history.reset(loaded.layout);
                self.autosave.mark_clean();
                self.last_saved = loaded.saved_at.or_else(|| Some(Utc::now()));
                self.notify_sync();
                true
            }
            Ok(None) => {
                debug!("No saved layout");
                false
            }
            Err(e) => {
                warn!("Failed to load layout: {}", e);
                self.error = Some(format!("Failed to load layout: {}", e));
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Sync and lifecycle
    // ------------------------------------------------------------------

    /// Push the current layout to the remote authority now.
    pub fn sync(&mut self) {
        if self.sync.is_none() {
            self.report(&LayoutError::RemoteUnavailable);
            return;
        }

        let now = self.clock.now();
        let events = match self.sync.as_mut() {
            Some(sync) => sync.sync_now(now, self.history.current()),
            None => Vec::new(),
        };
        self.apply_sync_events(events);
    }

    /// Open the live channel.
    pub fn start(&mut self) {
        let now = self.clock.now();
        let events = match self.sync.as_mut() {
            Some(sync) => sync.start(now, self.history.current()),
            None => return,
        };
        self.apply_sync_events(events);
    }

    /// Process inbound sync traffic and fire due timers.
    pub fn poll(&mut self) {
        let now = self.clock.now();

        let events = match self.sync.as_mut() {
            Some(sync) => sync.poll(now, self.history.current()),
            None => Vec::new(),
        };
        self.apply_sync_events(events);

        if self.autosave.poll(now) {
            self.save();
        }
    }

    /// Reconnect with a fresh attempt budget.
    pub fn reconnect(&mut self) {
        let now = self.clock.now();
        let events = match self.sync.as_mut() {
            Some(sync) => sync.reconnect(now, self.history.current()),
            None => return,
        };
        self.apply_sync_events(events);
    }

    pub fn disconnect(&mut self) {
        if let Some(sync) = self.sync.as_mut() {
            sync.disconnect();
        }
    }

    /// Flush unsaved edits and stop syncing.
    pub fn shutdown(&mut self) {
        if self.autosave.is_dirty() {
            self.save();
        }
        if let Some(sync) = self.sync.as_mut() {
            sync.stop();
        }
    }

    fn after_mutation(&mut self) {
        self.autosave.mark_dirty(self.clock.now());
        self.notify_sync();
    }

    fn notify_sync(&mut self) {
        let now = self.clock.now();
        if let Some(sync) = self.sync.as_mut() {
            sync.notify_local_change(now, self.history.current());
        }
    }

    fn apply_sync_events(&mut self, events: Vec<SyncEvent>) {
        for event in events {
            match event {
                SyncEvent::RemoteLayout(layout) => {
                    self.history.update(layout);
                    self.autosave.mark_dirty(self.clock.now());
                }
                SyncEvent::Connected => debug!("Sync connected"),
                SyncEvent::Disconnected { reason } => debug!("Sync disconnected: {}", reason),
            }
        }

        if let Some(message) = self.sync.as_mut().and_then(|sync| sync.take_error()) {
            self.error = Some(message);
        }
    }

    fn report(&mut self, error: &LayoutError) {
        warn!("{}", error);
        self.error = Some(error.to_string());
    }
}
