//! Layout synchronization with a remote authority.

pub mod engine;
pub mod http;
pub mod memory;
pub mod protocol;
pub mod transport;
pub mod ws;

pub use engine::{ConnectionState, SyncConfig, SyncEngine, SyncEvent, SyncStats, SyncStatus};
pub use http::{HttpFallbackSync, DEFAULT_HTTP_TIMEOUT};
pub use memory::{MemoryConnector, MemoryFallback, MemoryRemote};
pub use protocol::{Envelope, LayoutPayload};
pub use transport::{Channel, Connector, Delivery, FallbackSync};
pub use ws::{WsConnector, DEFAULT_CONNECT_TIMEOUT};
