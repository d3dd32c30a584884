//! In-memory transports.
//!
//! [`MemoryRemote`] plays the remote authority inside the same process. It
//! hands out a [`MemoryConnector`] and a [`MemoryFallback`] for the sync
//! engine while the test keeps the remote handle to inject inbound frames,
//! inspect outbound envelopes, drop the connection or refuse connects.
//! Fallback pushes can be held in flight until the test releases them.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::{LayoutError, Result};
use crate::layout::Layout;
use crate::sync::protocol::Envelope;
use crate::sync::transport::{Channel, Connector, Delivery, FallbackSync};

#[derive(Debug, Default)]
struct RemoteState {
    /// Frames queued for the client.
    inbound: VecDeque<String>,

    /// Frames the client sent, in order.
    sent: Vec<String>,

    /// Layouts pushed through the fallback path.
    fallback_pushes: Vec<Layout>,

    /// Fallback push held until released.
    held_push: Option<Layout>,
    release_held: bool,

    /// Generation of the currently open channel; bumping it kills old ones.
    generation: u64,

    open: bool,
    refuse_connects: bool,
    fail_fallback: bool,
    defer_fallback: bool,
    connect_attempts: u32,
}

/// Handle to an in-process remote authority.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Rc<RefCell<RemoteState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector for the sync engine.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            state: Rc::clone(&self.state),
        }
    }

    /// Request/response fallback for the sync engine.
    pub fn fallback(&self) -> MemoryFallback {
        MemoryFallback {
            state: Rc::clone(&self.state),
        }
    }

    /// Queue an envelope for the client.
    pub fn push(&self, envelope: &Envelope) {
        let text = envelope.encode().unwrap_or_default();
        self.push_raw(&text);
    }

    /// Queue a raw text frame for the client.
    pub fn push_raw(&self, text: &str) {
        self.state.borrow_mut().inbound.push_back(text.to_string());
    }

    /// Simulate the server dropping the connection.
    pub fn drop_connection(&self) {
        let mut state = self.state.borrow_mut();
        state.open = false;
        state.generation += 1;
        state.inbound.clear();
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_refuse_connects(&self, refuse: bool) {
        self.state.borrow_mut().refuse_connects = refuse;
    }

    /// Make subsequent fallback pushes fail (or succeed again).
    pub fn set_fail_fallback(&self, fail: bool) {
        self.state.borrow_mut().fail_fallback = fail;
    }

    /// Hold fallback pushes in flight until [`release_fallback`](Self::release_fallback).
    pub fn set_defer_fallback(&self, defer: bool) {
        self.state.borrow_mut().defer_fallback = defer;
    }

    /// Let the held fallback push finish on the client's next poll.
    pub fn release_fallback(&self) {
        self.state.borrow_mut().release_held = true;
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.borrow().connect_attempts
    }

    /// Every envelope the client sent, decoded. Undecodable frames are skipped.
    pub fn sent(&self) -> Vec<Envelope> {
        self.state
            .borrow()
            .sent
            .iter()
            .filter_map(|text| Envelope::decode(text).ok())
            .collect()
    }

    /// Sent envelopes of one `type`.
    pub fn sent_of_kind(&self, kind: &str) -> Vec<Envelope> {
        self.sent()
            .into_iter()
            .filter(|envelope| envelope.kind() == kind)
            .collect()
    }

    /// Forget everything sent so far.
    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }

    /// Layouts received through the fallback path.
    pub fn fallback_pushes(&self) -> Vec<Layout> {
        self.state.borrow().fallback_pushes.clone()
    }
}

/// [`Connector`] backed by a [`MemoryRemote`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Rc<RefCell<RemoteState>>,
}

impl Connector for MemoryConnector {
    fn connect(&mut self, url: &str) -> Result<Box<dyn Channel>> {
        let mut state = self.state.borrow_mut();
        state.connect_attempts += 1;

        if state.refuse_connects {
            return Err(LayoutError::ConnectFailed {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        state.generation += 1;
        state.open = true;
        Ok(Box::new(MemoryChannel {
            state: Rc::clone(&self.state),
            generation: state.generation,
            closed: false,
        }))
    }
}

/// Client end of an in-memory channel.
#[derive(Debug)]
pub struct MemoryChannel {
    state: Rc<RefCell<RemoteState>>,
    generation: u64,
    closed: bool,
}

impl MemoryChannel {
    fn check_alive(&self, state: &RemoteState) -> Result<()> {
        if self.closed || !state.open || state.generation != self.generation {
            Err(LayoutError::ChannelClosed)
        } else {
            Ok(())
        }
    }
}

impl Channel for MemoryChannel {
    fn send(&mut self, text: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        self.check_alive(&state)?;
        state.sent.push(text.to_string());
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<String>> {
        let mut state = self.state.borrow_mut();
        self.check_alive(&state)?;
        Ok(state.inbound.pop_front())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut state = self.state.borrow_mut();
        if state.generation == self.generation {
            state.open = false;
        }
    }
}

/// [`FallbackSync`] backed by a [`MemoryRemote`].
#[derive(Debug, Clone)]
pub struct MemoryFallback {
    state: Rc<RefCell<RemoteState>>,
}

fn accept_push(state: &mut RemoteState, layout: Layout) -> Result<()> {
    if state.fail_fallback {
        return Err(LayoutError::FallbackSyncFailed {
            reason: "server returned 503".to_string(),
        });
    }
    state.fallback_pushes.push(layout);
    Ok(())
}

impl FallbackSync for MemoryFallback {
    fn push_layout(&mut self, layout: &Layout, _timestamp: i64) -> Result<Delivery> {
        let mut state = self.state.borrow_mut();
        if state.defer_fallback {
            state.held_push = Some(layout.clone());
            state.release_held = false;
            return Ok(Delivery::InFlight);
        }
        accept_push(&mut state, layout.clone())?;
        Ok(Delivery::Done)
    }

    fn poll_delivery(&mut self) -> Option<Result<()>> {
        let mut state = self.state.borrow_mut();
        if !state.release_held {
            return None;
        }
        let layout = state.held_push.take()?;
        state.release_held = false;
        Some(accept_push(&mut state, layout))
    }
}
