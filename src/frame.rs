//! Per-frame coalescing of move input.
//!
//! Holds at most one pending value. The first offer schedules a flush one
//! frame later; offers before that flush overwrite the pending value.

use std::time::{Duration, Instant};

pub const DEFAULT_FRAME: Duration = Duration::from_millis(16);

#[derive(Debug)]
pub struct FrameCoalescer<T> {
    pending: Option<T>,
    interval: Duration,
    due: Option<Instant>,
}

impl<T> FrameCoalescer<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            pending: None,
            interval,
            due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Stores `value`, replacing anything not yet flushed.
    pub fn offer(&mut self, value: T, now: Instant) {
        if self.due.is_none() {
            self.due = Some(now + self.interval);
        }
        self.pending = Some(value);
    }

    /// Returns the pending value once its frame has come.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Flushes immediately, regardless of schedule.
    pub fn flush(&mut self) -> Option<T> {
        self.due = None;
        self.pending.take()
    }

    pub fn discard(&mut self) {
        self.due = None;
        self.pending = None;
    }
}

impl<T> Default for FrameCoalescer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_offer_within_frame_wins() {
        let t0 = Instant::now();
        let mut c = FrameCoalescer::new(Duration::from_millis(16));
        c.offer(10.0, t0);
        c.offer(20.0, t0 + Duration::from_millis(4));
        c.offer(30.0, t0 + Duration::from_millis(9));

        assert_eq!(c.take_due(t0 + Duration::from_millis(15)), None);
        assert_eq!(c.take_due(t0 + Duration::from_millis(16)), Some(30.0));
        assert_eq!(c.take_due(t0 + Duration::from_millis(40)), None);
    }

    #[test]
    fn later_offers_do_not_push_the_deadline() {
        let t0 = Instant::now();
        let mut c = FrameCoalescer::new(Duration::from_millis(16));
        c.offer(1, t0);
        c.offer(2, t0 + Duration::from_millis(15));
        assert_eq!(c.take_due(t0 + Duration::from_millis(16)), Some(2));
    }

    #[test]
    fn next_offer_after_flush_schedules_a_new_frame() {
        let t0 = Instant::now();
        let mut c = FrameCoalescer::new(Duration::from_millis(16));
        c.offer(1, t0);
        assert_eq!(c.take_due(t0 + Duration::from_millis(16)), Some(1));

        let t1 = t0 + Duration::from_millis(20);
        c.offer(2, t1);
        assert_eq!(c.take_due(t1 + Duration::from_millis(10)), None);
        assert_eq!(c.take_due(t1 + Duration::from_millis(16)), Some(2));
    }

    #[test]
    fn flush_and_discard_clear_the_slot() {
        let t0 = Instant::now();
        let mut c = FrameCoalescer::new(Duration::from_millis(16));
        c.offer(5, t0);
        assert_eq!(c.flush(), Some(5));
        assert!(!c.is_pending());

        c.offer(6, t0);
        c.discard();
        assert_eq!(c.take_due(t0 + Duration::from_secs(1)), None);
    }
}
