//! Undo/Redo History
//!
//! Snapshot-based undo/redo for dashboard layouts. Every mutation appends a
//! complete [`Layout`] to a bounded timeline; undo and redo move a cursor
//! over it.

use std::collections::VecDeque;

use log::debug;

use crate::error::{LayoutError, Result};
use crate::layout::{Layout, LayoutItem, LayoutItemPatch};

/// Default maximum number of snapshots to keep.
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 50;

/// Bounded undo/redo timeline of layout snapshots.
///
/// The timeline always holds at least one snapshot, and `current_index`
/// always points into it. When the timeline grows past
/// `max_history_size`, the oldest snapshot is evicted.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    /// Snapshots, oldest first.
    snapshots: VecDeque<Layout>,

    /// Position of the current layout in `snapshots`.
    current_index: usize,

    /// Maximum number of snapshots to keep.
    max_history_size: usize,

    /// Number of snapshots dropped from the front so far.
    evicted_count: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_SIZE)
    }
}

impl HistoryManager {
    /// Create a history starting from an empty layout.
    pub fn new(max_history_size: usize) -> Self {
        Self::with_initial(Layout::new(), max_history_size)
    }

    /// Create a history whose only snapshot is `initial`.
    pub fn with_initial(initial: Layout, max_history_size: usize) -> Self {
        let mut snapshots = VecDeque::new();
        snapshots.push_back(initial);
        Self {
            snapshots,
            current_index: 0,
            max_history_size: max_history_size.max(1),
            evicted_count: 0,
        }
    }

    /// The current layout.
    pub fn current(&self) -> &Layout {
        &self.snapshots[self.current_index]
    }

    /// Replace the whole layout.
    pub fn update(&mut self, layout: Layout) -> &Layout {
        self.record(layout);
        self.current()
    }

    /// Append an item to the layout.
    ///
    /// Fails without recording anything if an item with the same id exists.
    pub fn add(&mut self, item: LayoutItem) -> Result<&Layout> {
        if self.current().iter().any(|existing| existing.id == item.id) {
            return Err(LayoutError::DuplicateItemId { id: item.id });
        }

        let mut layout = self.current().clone();
        layout.push(item);
        self.record(layout);
        Ok(self.current())
    }

    /// Remove the item with `id`.
    ///
    /// Returns false, recording nothing, if no such item exists.
    pub fn remove(&mut self, id: &str) -> bool {
        if !self.current().iter().any(|item| item.id == id) {
            return false;
        }

        let layout: Layout = self
            .current()
            .iter()
            .filter(|item| item.id != id)
            .cloned()
            .collect();
        self.record(layout);
        true
    }

    /// Patch the item with `id`.
    ///
    /// Returns false, recording nothing, if no such item exists.
    pub fn update_item(&mut self, id: &str, patch: &LayoutItemPatch) -> bool {
        let mut layout = self.current().clone();
        let Some(item) = layout.iter_mut().find(|item| item.id == id) else {
            return false;
        };

        patch.apply(item);
        self.record(layout);
        true
    }

    /// Step back one snapshot. Returns `None` at the oldest snapshot.
    pub fn undo(&mut self) -> Option<&Layout> {
        if !self.can_undo() {
            return None;
        }
        self.current_index -= 1;
        debug!("undo -> snapshot {}/{}", self.current_index, self.snapshots.len());
        Some(self.current())
    }

    /// Step forward one snapshot. Returns `None` at the newest snapshot.
    pub fn redo(&mut self) -> Option<&Layout> {
        if !self.can_redo() {
            return None;
        }
        self.current_index += 1;
        debug!("redo -> snapshot {}/{}", self.current_index, self.snapshots.len());
        Some(self.current())
    }

    /// Check if there are snapshots that can be undone.
    pub fn can_undo(&self) -> bool {
        self.current_index > 0
    }

    /// Check if there are snapshots that can be redone.
    pub fn can_redo(&self) -> bool {
        self.current_index + 1 < self.snapshots.len()
    }

    /// Number of undo steps available.
    pub fn undo_depth(&self) -> usize {
        self.current_index
    }

    /// Number of redo steps available.
    pub fn redo_depth(&self) -> usize {
        self.snapshots.len() - 1 - self.current_index
    }

    /// Collapse the timeline to the current layout.
    ///
    /// Severs every past and future branch; used after a fresh load.
    pub fn clear(&mut self) {
        let current = self.current().clone();
        self.reset(current);
    }

    /// Collapse the timeline to `layout`.
    pub fn reset(&mut self, layout: Layout) {
        self.snapshots.clear();
        self.snapshots.push_back(layout);
        self.current_index = 0;
    }

    /// Number of snapshots in the timeline.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Always false; the timeline holds at least one snapshot.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Position of the current snapshot.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Iterate over all snapshots, oldest first.
    pub fn snapshots(&self) -> impl Iterator<Item = &Layout> {
        self.snapshots.iter()
    }

    /// Get the maximum number of snapshots.
    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    /// Set the maximum number of snapshots.
    ///
    /// If the timeline is longer than the new limit, the oldest snapshots are
    /// evicted. When eviction would reach the current snapshot, redo states
    /// are dropped first.
    pub fn set_max_history_size(&mut self, max_history_size: usize) {
        self.max_history_size = max_history_size.max(1);
        while self.snapshots.len() > self.max_history_size {
            if self.current_index == 0 {
                self.snapshots.pop_back();
            } else {
                self.evict_oldest();
            }
        }
    }

    /// Number of snapshots evicted by the size cap so far.
    pub fn evicted_count(&self) -> usize {
        self.evicted_count
    }

    fn record(&mut self, layout: Layout) {
        // Drop the redo branch
        self.snapshots.truncate(self.current_index + 1);
        self.snapshots.push_back(layout);

        if self.snapshots.len() > self.max_history_size {
            // The cursor keeps its numeric value, which now names the new snapshot
            self.snapshots.pop_front();
            self.evicted_count += 1;
        } else {
            self.current_index += 1;
        }
    }

    fn evict_oldest(&mut self) {
        if self.snapshots.pop_front().is_some() {
            self.current_index = self.current_index.saturating_sub(1);
            self.evicted_count += 1;
        }
    }
}
