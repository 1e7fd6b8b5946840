//! Debounced auto-save timing.
//!
//! The scheduler only tracks a deadline; it never sleeps itself. Time comes
//! from an injected [`Clock`] so tests can move it by hand with
//! [`ManualClock`], while the manager's background task sleeps on the real
//! clock until the deadline.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of "now" for the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-shot debounce deadline.
#[derive(Debug)]
pub struct AutoSaveScheduler {
    /// Wait this long after the last change before saving.
    debounce_delay: Duration,

    /// When the pending save should fire, if one is armed.
    deadline: Option<Instant>,

    /// Whether auto-save is enabled.
    enabled: bool,
}

impl AutoSaveScheduler {
    /// Default debounce delay (3 seconds).
    pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(3);

    pub fn new() -> Self {
        Self {
            debounce_delay: Self::DEFAULT_DEBOUNCE_DELAY,
            deadline: None,
            enabled: true,
        }
    }

    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn debounce_delay(&self) -> Duration {
        self.debounce_delay
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// (Re)arm the timer, replacing any pending deadline.
    pub fn arm(&mut self, now: Instant) {
        if !self.enabled {
            return;
        }
        self.deadline = Some(now + self.debounce_delay);
        tracing::trace!("Auto-save armed for {:?}", self.debounce_delay);
    }

    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            tracing::debug!("Auto-save cancelled");
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }

    /// Consume the deadline if it has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.deadline = None;
            true
        } else {
            false
        }
    }
}

impl Default for AutoSaveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let scheduler = AutoSaveScheduler::new();
        let clock = ManualClock::new();
        assert!(scheduler.deadline().is_none());
        assert!(!scheduler.is_due(clock.now()));
    }

    #[test]
    fn test_fires_after_delay() {
        let clock = ManualClock::new();
        let mut scheduler = AutoSaveScheduler::new().with_debounce_delay(Duration::from_secs(2));
        scheduler.arm(clock.now());

        clock.advance(Duration::from_secs(1));
        assert!(!scheduler.take_due(clock.now()));

        clock.advance(Duration::from_secs(1));
        assert!(scheduler.take_due(clock.now()));
        assert!(!scheduler.take_due(clock.now()));
    }

    #[test]
    fn test_rearm_pushes_deadline_back() {
        let clock = ManualClock::new();
        let mut scheduler = AutoSaveScheduler::new().with_debounce_delay(Duration::from_secs(2));
        scheduler.arm(clock.now());
        clock.advance(Duration::from_millis(1500));
        scheduler.arm(clock.now());
        clock.advance(Duration::from_millis(1500));

        assert!(!scheduler.is_due(clock.now()));
        clock.advance(Duration::from_millis(500));
        assert!(scheduler.is_due(clock.now()));
    }

    #[test]
    fn test_cancel() {
        let clock = ManualClock::new();
        let mut scheduler = AutoSaveScheduler::new();
        scheduler.arm(clock.now());
        scheduler.cancel();
        clock.advance(Duration::from_secs(60));
        assert!(!scheduler.is_due(clock.now()));
    }

    #[test]
    fn test_disabled_never_arms() {
        let clock = ManualClock::new();
        let mut scheduler = AutoSaveScheduler::new().with_enabled(false);
        scheduler.arm(clock.now());
        assert!(scheduler.deadline().is_none());
    }
}
