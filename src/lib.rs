//! gridsync - Dashboard Layout State Engine
//!
//! Owns the layout of a widget dashboard and keeps it consistent across
//! edits, reloads and devices:
//! - History: bounded undo/redo over immutable layout snapshots
//! - Persistence: durable and fallback storage tiers with legacy migration
//!   and debounced autosave
//! - Sync: live channel to a remote authority with reconnect, heartbeat and
//!   request/response fallback
//!
//! [`DashboardStore`] ties the three together behind a single action surface.
//! Everything runs on the caller's thread; the host drives timers by calling
//! [`DashboardStore::poll`].

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod layout;
pub mod state;
pub mod store;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, SyncSettings};
pub use error::{ErrorKind, LayoutError, Result};
pub use layout::{Layout, LayoutItem, LayoutItemPatch};
pub use store::DashboardStore;
pub use sync::{ConnectionState, SyncStatus};
