//! Clock capability.

use std::time::Instant;

/// Millisecond tick source and sleep facility.
///
/// The simulation driver substitutes virtual time; sleeping there
/// advances the event engine instead of the wall clock.
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> i64;
    fn sleep_ms(&self, ms: u64);
}

/// Wall-clock implementation for real hardware.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }
}
