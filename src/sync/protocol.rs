//! Wire envelopes exchanged with the remote authority.
//!
//! Every message is a JSON object tagged by `type`:
//!
//! ```json
//! {"type": "layout_update", "data": {"layout": [...]}, "timestamp": 1700000000000}
//! {"type": "layout_sync",   "data": {"layout": [...]}, "timestamp": 1700000000000}
//! {"type": "ping"}
//! {"type": "pong"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};
use crate::layout::Layout;

/// Payload carried by layout envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPayload {
    pub layout: Layout,
}

/// A typed sync message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Incremental layout change, sent in either direction.
    LayoutUpdate {
        data: LayoutPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },

    /// Full-state handshake sent right after connecting; inbound it
    /// acknowledges the client's state.
    LayoutSync {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<LayoutPayload>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },

    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },

    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
}

impl Envelope {
    pub fn layout_update(layout: Layout, timestamp: i64) -> Self {
        Envelope::LayoutUpdate {
            data: LayoutPayload { layout },
            timestamp: Some(timestamp),
        }
    }

    pub fn layout_sync(layout: Layout, timestamp: i64) -> Self {
        Envelope::LayoutSync {
            data: Some(LayoutPayload { layout }),
            timestamp: Some(timestamp),
        }
    }

    pub fn ping() -> Self {
        Envelope::Ping { timestamp: None }
    }

    pub fn pong() -> Self {
        Envelope::Pong { timestamp: None }
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::LayoutUpdate { .. } => "layout_update",
            Envelope::LayoutSync { .. } => "layout_sync",
            Envelope::Ping { .. } => "ping",
            Envelope::Pong { .. } => "pong",
        }
    }

    /// The layout carried by this envelope, if any.
    pub fn layout(&self) -> Option<&Layout> {
        match self {
            Envelope::LayoutUpdate { data, .. } => Some(&data.layout),
            Envelope::LayoutSync { data, .. } => data.as_ref().map(|d| &d.layout),
            Envelope::Ping { .. } | Envelope::Pong { .. } => None,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| LayoutError::MalformedEnvelope {
            reason: e.to_string(),
        })
    }
}
