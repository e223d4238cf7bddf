//! Time source used by the scroll driver and the export pipeline.
//!
//! Every suspension point in a job (scroll polling, settle delay, the
//! inter-page yield) goes through a `Clock`, so tests can swap in a
//! `ManualClock` and run a full 60 second scroll timeout instantly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub trait Clock {
    /// Time elapsed since the clock was created
    fn elapsed(&self) -> Duration;

    /// Block the current job for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::time::Instant` and `thread::sleep`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` advances time without waiting.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.now_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let c = ManualClock::new();
        assert_eq!(c.elapsed(), Duration::ZERO);
        c.sleep(Duration::from_millis(150));
        c.sleep(Duration::from_millis(150));
        assert_eq!(c.elapsed(), Duration::from_millis(300));
    }
}
