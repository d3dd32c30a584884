//! Debounced autosave.
//!
//! Edits mark the layout dirty and restart a quiet-period timer. When the
//! timer expires the host saves the layout current at that moment, so a
//! burst of edits costs one write.
//!
//! Timers are plain deadline fields driven by the caller's clock; nothing
//! here spawns threads or sleeps.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::debug;

/// Default quiet period before an autosave fires.
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(1000);

/// A restartable one-shot timer.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet_period: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            deadline: None,
        }
    }

    /// Get the quiet period.
    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Start or restart the timer at `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet_period);
    }

    /// Cancel a pending fire.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Whether the timer is armed.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the timer fires, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the timer fires, if armed.
    pub fn time_until_fire(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Disarm and return true if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Tracks unsaved changes and decides when to autosave.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    timer: Debouncer,

    /// Whether there are unsaved changes.
    dirty: bool,

    /// Whether autosave is active.
    enabled: bool,

    /// Timestamp of the last successful save.
    last_save_time: Option<DateTime<Utc>>,

    /// Message from the last failed save, cleared by the next success.
    last_error: Option<String>,

    /// Number of successful saves.
    save_count: u64,
}

impl Default for AutosaveScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_AUTOSAVE_DELAY)
    }
}

impl AutosaveScheduler {
    /// Create a scheduler with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            timer: Debouncer::new(delay),
            dirty: false,
            enabled: true,
            last_save_time: None,
            last_error: None,
            save_count: 0,
        }
    }

    /// Record an edit at `now`, restarting the quiet period.
    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty = true;
        if self.enabled {
            self.timer.schedule(now);
        }
    }

    /// Forget unsaved changes (e.g. after a fresh load).
    pub fn mark_clean(&mut self) {
        self.dirty = false;
        self.timer.cancel();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable autosave.
    ///
    /// Re-enabling with unsaved changes restarts the quiet period at `now`.
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        self.enabled = enabled;
        if !enabled {
            self.timer.cancel();
        } else if self.dirty {
            self.timer.schedule(now);
        }
    }

    /// Returns true when a save should happen now.
    ///
    /// The timer is disarmed by this call; the caller reports the outcome
    /// through [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn poll(&mut self, now: Instant) -> bool {
        self.timer.fire_if_due(now) && self.dirty && self.enabled
    }

    /// Whether a save is scheduled.
    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    /// Time left until the pending save, if any.
    pub fn time_until_save(&self, now: Instant) -> Option<Duration> {
        self.timer.time_until_fire(now)
    }

    /// Record a successful save.
    pub fn record_success(&mut self) {
        self.dirty = false;
        self.timer.cancel();
        self.last_save_time = Some(Utc::now());
        self.last_error = None;
        self.save_count += 1;
        debug!("Autosave #{} complete", self.save_count);
    }

    /// Record a failed save. The layout stays dirty; the next edit
    /// schedules another attempt.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn last_save_time(&self) -> Option<DateTime<Utc>> {
        self.last_save_time
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn save_count(&self) -> u64 {
        self.save_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_defaults() {
        let scheduler = AutosaveScheduler::default();
        assert!(!scheduler.is_dirty());
        assert!(scheduler.is_enabled());
        assert!(!scheduler.is_pending());
        assert!(scheduler.last_save_time().is_none());
    }

    #[test]
    fn test_debouncer_restarts_on_schedule() {
        let start = Instant::now();
        let mut timer = Debouncer::new(Duration::from_millis(500));

        timer.schedule(start);
        timer.schedule(start + Duration::from_millis(400));

        assert!(!timer.fire_if_due(start + Duration::from_millis(600)));
        assert_eq!(
            timer.time_until_fire(start + Duration::from_millis(600)),
            Some(Duration::from_millis(300))
        );
        assert!(timer.fire_if_due(start + Duration::from_millis(900)));
        assert!(!timer.is_pending());
        assert!(!timer.fire_if_due(start + Duration::from_millis(2000)));
    }

    #[test]
    fn test_burst_of_edits_saves_once() {
        let start = Instant::now();
        let mut scheduler = AutosaveScheduler::new(Duration::from_secs(1));

        for i in 0..5 {
            scheduler.mark_dirty(start + Duration::from_millis(i * 200));
        }

        assert!(!scheduler.poll(start + Duration::from_millis(1500)));
        assert!(scheduler.poll(start + Duration::from_millis(1800)));
        scheduler.record_success();

        assert!(!scheduler.is_dirty());
        assert!(!scheduler.poll(start + Duration::from_secs(10)));
        assert_eq!(scheduler.save_count(), 1);
    }

    #[test]
    fn test_failure_keeps_dirty() {
        let start = Instant::now();
        let mut scheduler = AutosaveScheduler::new(Duration::from_secs(1));
        scheduler.mark_dirty(start);

        assert!(scheduler.poll(start + Duration::from_secs(1)));
        scheduler.record_failure("disk full");

        assert!(scheduler.is_dirty());
        assert_eq!(scheduler.last_error(), Some("disk full"));

        scheduler.mark_dirty(start + Duration::from_secs(2));
        assert!(scheduler.poll(start + Duration::from_secs(3)));
        scheduler.record_success();
        assert!(scheduler.last_error().is_none());
    }

    #[test]
    fn test_disabled_never_fires() {
        let start = Instant::now();
        let mut scheduler = AutosaveScheduler::new(Duration::from_secs(1));
        scheduler.set_enabled(false, start);
        scheduler.mark_dirty(start);

        assert!(!scheduler.poll(start + Duration::from_secs(5)));
        assert!(scheduler.is_dirty());

        scheduler.set_enabled(true, start + Duration::from_secs(5));
        assert!(scheduler.poll(start + Duration::from_secs(6)));
    }

    #[test]
    fn test_mark_clean_cancels_pending_save() {
        let start = Instant::now();
        let mut scheduler = AutosaveScheduler::new(Duration::from_secs(1));
        scheduler.mark_dirty(start);
        scheduler.mark_clean();

        assert!(!scheduler.is_pending());
        assert!(!scheduler.poll(start + Duration::from_secs(2)));
    }
}
