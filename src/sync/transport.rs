//! Transport seams for the sync engine.
//!
//! The engine talks to the remote authority through two traits: a
//! [`Connector`] that opens a persistent [`Channel`], and a
//! [`FallbackSync`] used for one-shot request/response sync while the
//! channel is down. Neither may block the caller for longer than its own
//! configured budget.

use crate::error::Result;
use crate::layout::Layout;

/// An open, non-blocking bidirectional text channel.
pub trait Channel {
    /// Send one text frame.
    fn send(&mut self, text: &str) -> Result<()>;

    /// Return the next inbound text frame, or `None` if nothing is waiting.
    ///
    /// An error means the channel is no longer usable.
    fn try_recv(&mut self) -> Result<Option<String>>;

    /// Close the channel. Further calls are no-ops.
    fn close(&mut self);
}

/// Opens channels to a remote endpoint.
pub trait Connector {
    fn connect(&mut self, url: &str) -> Result<Box<dyn Channel>>;
}

/// How far a fallback push got before [`FallbackSync::push_layout`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The remote accepted the layout.
    Done,
    /// The request is running elsewhere; collect it with
    /// [`FallbackSync::poll_delivery`].
    InFlight,
}

/// One-shot request/response sync.
pub trait FallbackSync {
    /// Start pushing `layout`. A new push replaces one still in flight.
    fn push_layout(&mut self, layout: &Layout, timestamp: i64) -> Result<Delivery>;

    /// Outcome of the in-flight push, once it has finished.
    fn poll_delivery(&mut self) -> Option<Result<()>> {
        None
    }
}
