//! Coalescing of redraw requests.
//!
//! Log bursts produce far more "please redraw" signals than a terminal can
//! usefully display. The scheduler collapses them: the first request in a
//! window arms a single deferred render, every further request is a no-op
//! until that render fires. Trailing-edge behavior guarantees the last
//! requested state always reaches the screen. Low-frequency, latency-
//! sensitive interactions (stop, exit, focus change) draw directly and never
//! go through here.

use std::time::Duration;

/// At most one scheduled redraw at any instant.
#[derive(Debug)]
pub struct RenderScheduler {
    throttle: Duration,
    pending: bool,
}

impl RenderScheduler {
    pub fn new(throttle_ms: u64) -> Self {
        Self {
            throttle: Duration::from_millis(throttle_ms),
            pending: false,
        }
    }

    /// Requests a redraw. Returns the throttle delay when this call armed the
    /// render; `None` when one is already scheduled.
    pub fn request(&mut self) -> Option<Duration> {
        if self.pending {
            return None;
        }
        self.pending = true;
        Some(self.throttle)
    }

    /// Marks the scheduled render as performed.
    pub fn fired(&mut self) {
        self.pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn many_requests_in_one_window_arm_a_single_render() {
        let mut scheduler = RenderScheduler::new(40);
        assert_eq!(scheduler.request(), Some(Duration::from_millis(40)));
        for _ in 0..100 {
            assert_eq!(scheduler.request(), None);
        }
        assert!(scheduler.is_pending());
    }

    #[test]
    fn firing_opens_the_next_window() {
        let mut scheduler = RenderScheduler::new(40);
        assert!(scheduler.request().is_some());
        scheduler.fired();
        assert!(!scheduler.is_pending());
        // Trailing edge: state changed after the fire gets its own render.
        assert!(scheduler.request().is_some());
    }
}
