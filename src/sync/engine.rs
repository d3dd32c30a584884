//! Sync engine.
//!
//! Keeps the local layout converged with a remote authority over a live
//! channel, falling back to one-shot request/response sync while the channel
//! is down. The engine performs no I/O on its own schedule: the host drives
//! it through [`SyncEngine::poll`], which drains inbound frames, collects
//! finished fallback pushes and fires any due timers (outgoing debounce,
//! heartbeat, reconnect).

use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, info, warn};

use crate::error::{LayoutError, Result};
use crate::layout::Layout;
use crate::state::Debouncer;
use crate::sync::protocol::Envelope;
use crate::sync::transport::{Channel, Connector, Delivery, FallbackSync};

pub const DEFAULT_WS_URL: &str = "ws://localhost:3001/ws";
pub const DEFAULT_HTTP_URL: &str = "http://localhost:3001/api/layout";
pub const DEFAULT_SYNC_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// How often the host is woken to collect an in-flight fallback push.
const DELIVERY_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Live channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Outcome of the most recent sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// Timing and endpoint settings for [`SyncEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub ws_url: String,
    pub http_url: String,
    pub debounce: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            http_url: DEFAULT_HTTP_URL.to_string(),
            debounce: DEFAULT_SYNC_DEBOUNCE,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Something the host should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The channel opened and the handshake was sent.
    Connected,
    /// The channel went away.
    Disconnected { reason: String },
    /// The remote authority's layout won; adopt it as the local layout.
    RemoteLayout(Layout),
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub dropped_envelopes: u64,
    pub reconnect_attempts: u64,
    pub fallback_syncs: u64,
}

/// Client side of layout synchronization.
pub struct SyncEngine {
    config: SyncConfig,
    connector: Box<dyn Connector>,
    fallback: Box<dyn FallbackSync>,
    channel: Option<Box<dyn Channel>>,

    running: bool,
    connection_state: ConnectionState,
    status: SyncStatus,
    last_error: Option<String>,
    /// Error not yet collected by the host.
    unreported_error: Option<String>,

    /// Layout most recently known to match the remote copy.
    last_synced: Option<Layout>,
    /// Wall-clock millis of the oldest unsent local change.
    local_modified_at: Option<i64>,

    outgoing: Debouncer,
    /// Layout of the fallback push still in flight.
    in_flight: Option<Layout>,
    delivery_check_at: Option<Instant>,
    heartbeat_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    reconnect_attempts: u32,

    stats: SyncStats,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("running", &self.running)
            .field("connection_state", &self.connection_state)
            .field("status", &self.status)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("stats", &self.stats)
            .finish()
    }
}

fn wall_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        connector: Box<dyn Connector>,
        fallback: Box<dyn FallbackSync>,
    ) -> Self {
        let outgoing = Debouncer::new(config.debounce);
        Self {
            config,
            connector,
            fallback,
            channel: None,
            running: false,
            connection_state: ConnectionState::Disconnected,
            status: SyncStatus::Idle,
            last_error: None,
            unreported_error: None,
            last_synced: None,
            local_modified_at: None,
            outgoing,
            in_flight: None,
            delivery_check_at: None,
            heartbeat_at: None,
            reconnect_at: None,
            reconnect_attempts: 0,
            stats: SyncStats::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Take the latest error raised since the previous call.
    pub fn take_error(&mut self) -> Option<String> {
        self.unreported_error.take()
    }

    pub fn last_synced(&self) -> Option<&Layout> {
        self.last_synced.as_ref()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Consecutive reconnects scheduled since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_at.is_some()
    }

    /// Whether a fallback push has been handed off and not yet collected.
    pub fn is_delivery_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Earliest instant at which [`poll`](Self::poll) has timer work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.outgoing.deadline(),
            self.delivery_check_at,
            self.heartbeat_at,
            self.reconnect_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Begin syncing and open the channel.
    pub fn start(&mut self, now: Instant, local: &Layout) -> Vec<SyncEvent> {
        self.running = true;
        self.reconnect_attempts = 0;
        self.reconnect_at = None;

        if self.channel.is_some() {
            return Vec::new();
        }
        self.connect(now, local).into_iter().collect()
    }

    /// Stop syncing: close the channel and cancel every timer.
    pub fn stop(&mut self) {
        self.running = false;
        self.outgoing.cancel();
        self.in_flight = None;
        self.delivery_check_at = None;
        self.disconnect();
    }

    /// Close the channel and clear pending reconnect and heartbeat timers.
    pub fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.heartbeat_at = None;

        if let Some(mut channel) = self.channel.take() {
            channel.close();
            info!("Disconnected from {}", self.config.ws_url);
        }
        self.connection_state = ConnectionState::Disconnected;
    }

    /// Drop any current channel and connect again with a fresh attempt budget.
    pub fn reconnect(&mut self, now: Instant, local: &Layout) -> Vec<SyncEvent> {
        self.disconnect();
        self.running = true;
        self.reconnect_attempts = 0;
        self.connect(now, local).into_iter().collect()
    }

    /// Tell the engine the local layout changed.
    pub fn notify_local_change(&mut self, now: Instant, local: &Layout) {
        if !self.running {
            return;
        }

        if self.has_unsent(local) {
            if self.local_modified_at.is_none() {
                self.local_modified_at = Some(wall_millis());
            }
            self.outgoing.schedule(now);
        } else {
            self.local_modified_at = None;
            self.outgoing.cancel();
        }
    }

    /// Push the local layout right away, bypassing the debounce.
    pub fn sync_now(&mut self, now: Instant, local: &Layout) -> Vec<SyncEvent> {
        self.outgoing.cancel();
        self.push(now, local).into_iter().collect()
    }

    /// Drain inbound frames and fire due timers.
    ///
    /// `local` is the host's current layout. Any [`SyncEvent::RemoteLayout`]
    /// returned must be adopted by the host before the next call.
    pub fn poll(&mut self, now: Instant, local: &Layout) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        let mut adopted: Option<Layout> = None;

        while let Some(channel) = self.channel.as_mut() {
            let text = match channel.try_recv() {
                Ok(Some(text)) => text,
                Ok(None) => break,
                Err(e) => {
                    events.push(self.channel_failed(now, e));
                    break;
                }
            };

            let current = adopted.as_ref().unwrap_or(local);
            match self.handle_frame(now, &text, current) {
                Ok(Some(remote)) => {
                    adopted = Some(remote.clone());
                    events.push(SyncEvent::RemoteLayout(remote));
                }
                Ok(None) => {}
                Err(e) => {
                    events.push(self.channel_failed(now, e));
                    break;
                }
            }
        }

        let current = adopted.as_ref().unwrap_or(local);

        if self.in_flight.is_some() {
            self.collect_delivery(now, current);
        }

        if self.heartbeat_at.map_or(false, |at| now >= at) {
            self.heartbeat_at = Some(now + self.config.heartbeat_interval);
            if let Err(e) = self.send_envelope(&Envelope::ping()) {
                events.push(self.channel_failed(now, e));
            }
        }

        if self.reconnect_at.map_or(false, |at| now >= at) {
            self.reconnect_at = None;
            if self.running {
                events.extend(self.connect(now, current));
            }
        }

        if self.outgoing.fire_if_due(now) && self.has_unsent(current) {
            events.extend(self.push(now, current));
        }

        events
    }

    fn has_unsent(&self, local: &Layout) -> bool {
        self.last_synced.as_ref() != Some(local)
    }

    fn connect(&mut self, now: Instant, local: &Layout) -> Option<SyncEvent> {
        self.connection_state = ConnectionState::Connecting;
        debug!("Connecting to {}", self.config.ws_url);

        let channel = match self.connector.connect(&self.config.ws_url) {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Connect to {} failed: {}", self.config.ws_url, e);
                self.connection_state = ConnectionState::Disconnected;
                self.set_error(&e);
                self.schedule_reconnect(now);
                return None;
            }
        };

        self.channel = Some(channel);
        self.connection_state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.status = SyncStatus::Idle;
        self.last_error = None;
        self.heartbeat_at = Some(now + self.config.heartbeat_interval);
        info!("Connected to {}", self.config.ws_url);

        let handshake = Envelope::layout_sync(local.clone(), wall_millis());
        if let Err(e) = self.send_envelope(&handshake) {
            return Some(self.channel_failed(now, e));
        }

        self.last_synced = Some(local.clone());
        self.local_modified_at = None;
        self.outgoing.cancel();
        Some(SyncEvent::Connected)
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if !self.running {
            return;
        }

        if self.reconnect_attempts < self.config.max_reconnect_attempts {
            self.reconnect_attempts += 1;
            self.stats.reconnect_attempts += 1;
            self.reconnect_at = Some(now + self.config.reconnect_interval);
            debug!(
                "Reconnect attempt {}/{} in {}ms",
                self.reconnect_attempts,
                self.config.max_reconnect_attempts,
                self.config.reconnect_interval.as_millis()
            );
        } else {
            self.reconnect_at = None;
            warn!(
                "Giving up on {} after {} reconnect attempts",
                self.config.ws_url, self.reconnect_attempts
            );
        }
    }

    fn channel_failed(&mut self, now: Instant, error: LayoutError) -> SyncEvent {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.connection_state = ConnectionState::Disconnected;
        self.heartbeat_at = None;

        match error {
            LayoutError::ChannelClosed => info!("Channel to {} closed", self.config.ws_url),
            ref other => {
                warn!("Channel to {} failed: {}", self.config.ws_url, other);
                self.set_error(other);
            }
        }

        self.schedule_reconnect(now);
        SyncEvent::Disconnected {
            reason: error.to_string(),
        }
    }

    fn set_error(&mut self, error: &LayoutError) {
        self.status = SyncStatus::Error;
        self.last_error = Some(error.to_string());
        self.unreported_error = Some(error.to_string());
    }

    fn send_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        let text = envelope.encode()?;
        let channel = self.channel.as_mut().ok_or(LayoutError::ChannelClosed)?;
        channel.send(&text)?;
        self.stats.messages_sent += 1;
        Ok(())
    }

    /// Handle one inbound frame; returns a remote layout to adopt.
    fn handle_frame(&mut self, now: Instant, text: &str, current: &Layout) -> Result<Option<Layout>> {
        self.stats.messages_received += 1;

        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping inbound frame: {}", e);
                self.stats.dropped_envelopes += 1;
                return Ok(None);
            }
        };

        match envelope {
            Envelope::Ping { .. } => {
                self.send_envelope(&Envelope::pong())?;
                Ok(None)
            }
            Envelope::Pong { .. } => Ok(None),
            Envelope::LayoutSync { .. } => {
                debug!("Remote acknowledged layout");
                self.status = SyncStatus::Success;
                Ok(None)
            }
            Envelope::LayoutUpdate { data, timestamp } => {
                Ok(self.reconcile(now, data.layout, timestamp, current))
            }
        }
    }

    fn reconcile(
        &mut self,
        now: Instant,
        remote: Layout,
        timestamp: Option<i64>,
        current: &Layout,
    ) -> Option<Layout> {
        if remote == *current {
            debug!("Remote layout matches local");
            self.last_synced = Some(remote);
            self.local_modified_at = None;
            self.outgoing.cancel();
            return None;
        }

        if self.has_unsent(current) {
            if let (Some(remote_at), Some(local_at)) = (timestamp, self.local_modified_at) {
                if local_at > remote_at {
                    info!(
                        "Keeping local layout modified at {} over remote from {}",
                        local_at, remote_at
                    );
                    if !self.outgoing.is_pending() {
                        self.outgoing.schedule(now);
                    }
                    return None;
                }
            }
        }

        info!("Adopting remote layout with {} items", remote.len());
        self.last_synced = Some(remote.clone());
        self.local_modified_at = None;
        self.outgoing.cancel();
        self.status = SyncStatus::Success;
        Some(remote)
    }

    fn push(&mut self, now: Instant, local: &Layout) -> Option<SyncEvent> {
        let timestamp = wall_millis();

        if self.channel.is_some() {
            if !self.has_unsent(local) {
                debug!("Layout already synced");
                return None;
            }

            let envelope = Envelope::layout_update(local.clone(), timestamp);
            return match self.send_envelope(&envelope) {
                Ok(()) => {
                    self.last_synced = Some(local.clone());
                    self.local_modified_at = None;
                    self.status = SyncStatus::Syncing;
                    None
                }
                Err(e) => Some(self.channel_failed(now, e)),
            };
        }

        if self.in_flight.is_some() {
            debug!("Fallback push still in flight; retrying after the debounce");
            self.outgoing.schedule(now);
            return None;
        }

        self.status = SyncStatus::Syncing;
        match self.fallback.push_layout(local, timestamp) {
            Ok(Delivery::Done) => self.fallback_delivered(local.clone(), local),
            Ok(Delivery::InFlight) => {
                debug!("Fallback push of {} items in flight", local.len());
                self.in_flight = Some(local.clone());
                self.delivery_check_at = Some(now + DELIVERY_CHECK_INTERVAL);
            }
            Err(e) => {
                warn!("Fallback sync failed: {}", e);
                self.set_error(&e);
            }
        }
        None
    }

    fn collect_delivery(&mut self, now: Instant, current: &Layout) {
        let Some(outcome) = self.fallback.poll_delivery() else {
            self.delivery_check_at = Some(now + DELIVERY_CHECK_INTERVAL);
            return;
        };

        self.delivery_check_at = None;
        let Some(pushed) = self.in_flight.take() else {
            return;
        };
        match outcome {
            Ok(()) => self.fallback_delivered(pushed, current),
            Err(e) => {
                warn!("Fallback sync failed: {}", e);
                self.set_error(&e);
            }
        }
    }

    fn fallback_delivered(&mut self, pushed: Layout, current: &Layout) {
        debug!("Fallback sync pushed {} items", pushed.len());
        self.stats.fallback_syncs += 1;
        self.last_synced = Some(pushed);
        if !self.has_unsent(current) {
            self.local_modified_at = None;
        }
        self.status = SyncStatus::Success;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutItem;
    use crate::sync::memory::MemoryRemote;

    fn engine(remote: &MemoryRemote) -> SyncEngine {
        SyncEngine::new(
            SyncConfig::default(),
            Box::new(remote.connector()),
            Box::new(remote.fallback()),
        )
    }

    fn layout(ids: &[&str]) -> Layout {
        ids.iter()
            .enumerate()
            .map(|(i, id)| LayoutItem::new(*id, "chart", 0, i as u32 * 2, 4, 2))
            .collect()
    }

    #[test]
    fn test_start_sends_handshake() {
        let remote = MemoryRemote::new();
        let mut sync = engine(&remote);
        let local = layout(&["a"]);

        let events = sync.start(Instant::now(), &local);

        assert_eq!(events, vec![SyncEvent::Connected]);
        assert_eq!(sync.connection_state(), ConnectionState::Connected);
        assert_eq!(sync.status(), SyncStatus::Idle);
        assert_eq!(sync.last_synced(), Some(&local));

        let sent = remote.sent_of_kind("layout_sync");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].layout(), Some(&local));
    }

    #[test]
    fn test_debounced_update_is_sent_once() {
        let remote = MemoryRemote::new();
        let mut sync = engine(&remote);
        let start = Instant::now();
        sync.start(start, &Vec::new());

        let first = layout(&["a"]);
        let second = layout(&["a", "b"]);
        sync.notify_local_change(start, &first);
        sync.notify_local_change(start + Duration::from_millis(300), &second);

        assert!(sync.poll(start + Duration::from_millis(600), &second).is_empty());
        assert!(remote.sent_of_kind("layout_update").is_empty());

        sync.poll(start + Duration::from_millis(800), &second);

        let updates = remote.sent_of_kind("layout_update");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].layout(), Some(&second));
        assert_eq!(sync.status(), SyncStatus::Syncing);
    }

    #[test]
    fn test_ack_marks_success() {
        let remote = MemoryRemote::new();
        let mut sync = engine(&remote);
        let now = Instant::now();
        sync.start(now, &Vec::new());

        remote.push_raw(r#"{"type":"layout_sync"}"#);
        sync.poll(now, &Vec::new());

        assert_eq!(sync.status(), SyncStatus::Success);
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let remote = MemoryRemote::new();
        let mut sync = engine(&remote);
        let now = Instant::now();
        sync.start(now, &Vec::new());

        remote.push(&Envelope::ping());
        let events = sync.poll(now, &Vec::new());

        assert!(events.is_empty());
        assert_eq!(remote.sent_of_kind("pong").len(), 1);
        assert_eq!(sync.status(), SyncStatus::Idle);
    }

    #[test]
    fn test_heartbeat_pings_on_interval() {
        let remote = MemoryRemote::new();
        let mut sync = engine(&remote);
        let start = Instant::now();
        sync.start(start, &Vec::new());

        sync.poll(start + Duration::from_secs(29), &Vec::new());
        assert!(remote.sent_of_kind("ping").is_empty());

        sync.poll(start + Duration::from_secs(30), &Vec::new());
        sync.poll(start + Duration::from_secs(60), &Vec::new());
        assert_eq!(remote.sent_of_kind("ping").len(), 2);
    }

    #[test]
    fn test_stop_cancels_timers() {
        let remote = MemoryRemote::new();
        let mut sync = engine(&remote);
        let start = Instant::now();
        sync.start(start, &Vec::new());
        sync.notify_local_change(start, &layout(&["a"]));

        sync.stop();

        assert!(!remote.is_open());
        assert_eq!(sync.next_deadline(), None);
        assert!(sync.poll(start + Duration::from_secs(60), &layout(&["a"])).is_empty());
    }

    #[test]
    fn test_fallback_push_collected_on_poll() {
        let remote = MemoryRemote::new();
        remote.set_defer_fallback(true);
        let mut sync = engine(&remote);
        let start = Instant::now();
        let local = layout(&["a"]);

        sync.sync_now(start, &local);
        assert!(sync.is_delivery_pending());
        assert_eq!(sync.status(), SyncStatus::Syncing);
        assert_eq!(sync.next_deadline(), Some(start + DELIVERY_CHECK_INTERVAL));

        sync.poll(start + DELIVERY_CHECK_INTERVAL, &local);
        assert!(sync.is_delivery_pending());

        remote.release_fallback();
        sync.poll(start + DELIVERY_CHECK_INTERVAL * 2, &local);

        assert!(!sync.is_delivery_pending());
        assert_eq!(sync.status(), SyncStatus::Success);
        assert_eq!(sync.last_synced(), Some(&local));
        assert_eq!(sync.stats().fallback_syncs, 1);
        assert_eq!(sync.next_deadline(), None);
    }

    #[test]
    fn test_edit_during_fallback_push_follows_it() {
        let remote = MemoryRemote::new();
        remote.set_refuse_connects(true);
        remote.set_defer_fallback(true);
        let mut sync = engine(&remote);
        let start = Instant::now();
        let ms = |n: u64| start + Duration::from_millis(n);
        let first = layout(&["a"]);
        let second = layout(&["a", "b"]);
        sync.start(start, &Vec::new());

        sync.notify_local_change(start, &first);
        sync.poll(ms(500), &first);
        assert!(sync.is_delivery_pending());

        // Debounce fires while the first push is still out.
        sync.notify_local_change(ms(600), &second);
        sync.poll(ms(1100), &second);
        assert!(remote.fallback_pushes().is_empty());

        remote.release_fallback();
        sync.poll(ms(1150), &second);
        assert_eq!(remote.fallback_pushes(), vec![first.clone()]);
        assert_eq!(sync.last_synced(), Some(&first));

        sync.poll(ms(1600), &second);
        remote.release_fallback();
        sync.poll(ms(1650), &second);

        assert_eq!(remote.fallback_pushes(), vec![first, second.clone()]);
        assert_eq!(sync.last_synced(), Some(&second));
        assert_eq!(sync.status(), SyncStatus::Success);
    }

    #[test]
    fn test_failed_fallback_delivery_sets_error() {
        let remote = MemoryRemote::new();
        remote.set_defer_fallback(true);
        remote.set_fail_fallback(true);
        let mut sync = engine(&remote);
        let start = Instant::now();

        sync.sync_now(start, &layout(&["a"]));
        remote.release_fallback();
        sync.poll(start, &layout(&["a"]));

        assert_eq!(sync.status(), SyncStatus::Error);
        assert!(sync.take_error().unwrap().contains("503"));
        assert!(sync.last_synced().is_none());
    }

    #[test]
    fn test_failed_connect_schedules_reconnect() {
        let remote = MemoryRemote::new();
        remote.set_refuse_connects(true);
        let mut sync = engine(&remote);
        let start = Instant::now();

        assert!(sync.start(start, &Vec::new()).is_empty());
        assert_eq!(sync.connection_state(), ConnectionState::Disconnected);
        assert_eq!(sync.status(), SyncStatus::Error);
        assert!(sync.last_error().is_some());
        assert_eq!(sync.reconnect_attempts(), 1);
        assert_eq!(sync.next_deadline(), Some(start + DEFAULT_RECONNECT_INTERVAL));
    }
}
