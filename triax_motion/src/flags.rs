//! Process-wide control flags.
//!
//! `control_enabled` gates main power: setting it actuates the relay to
//! match. `stall_detection` switches the supervisor's stall check.
//! Written by the command adapter and, on fault, by the supervisor;
//! read everywhere.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use triax_hal::Relay;

/// Global control-enable and stall-detection switches.
pub struct SystemFlags {
    control_enabled: AtomicBool,
    stall_detection: AtomicBool,
    relay: Arc<dyn Relay>,
}

impl SystemFlags {
    /// Flags start with control disabled (relay off) and stall
    /// detection on.
    pub fn new(relay: Arc<dyn Relay>) -> Self {
        Self {
            control_enabled: AtomicBool::new(false),
            stall_detection: AtomicBool::new(true),
            relay,
        }
    }

    /// Set the control-enable flag and actuate the main power relay to
    /// match.
    ///
    /// The Release store is ordered before the relay write so readers
    /// that observe the flag also observe the power state it implies.
    pub fn set_control_enabled(&self, enabled: bool) {
        self.control_enabled.store(enabled, Ordering::Release);
        self.relay.set(enabled);
        info!("control enabled: {enabled}");
    }

    #[inline]
    pub fn control_enabled(&self) -> bool {
        self.control_enabled.load(Ordering::Acquire)
    }

    pub fn set_stall_detection(&self, enabled: bool) {
        self.stall_detection.store(enabled, Ordering::Release);
        info!("stall detection: {enabled}");
    }

    #[inline]
    pub fn stall_detection(&self) -> bool {
        self.stall_detection.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triax_hal::sim::SimRelay;

    #[test]
    fn control_enable_actuates_the_relay() {
        let relay = Arc::new(SimRelay::new());
        let flags = SystemFlags::new(relay.clone());
        assert!(!flags.control_enabled());
        assert!(!relay.is_on());

        flags.set_control_enabled(true);
        assert!(flags.control_enabled());
        assert!(relay.is_on());

        flags.set_control_enabled(false);
        assert!(!flags.control_enabled());
        assert!(!relay.is_on());
    }

    #[test]
    fn stall_detection_defaults_on() {
        let flags = SystemFlags::new(Arc::new(SimRelay::new()));
        assert!(flags.stall_detection());
        flags.set_stall_detection(false);
        assert!(!flags.stall_detection());
    }
}
