//! Simulation driver.
//!
//! A [`SimRig`] bundles virtual time, per-axis simulated peripherals and
//! the main relay, in one of two modes:
//!
//! - **Manual** ([`SimRig::new`]): time advances only through
//!   [`SimRig::advance_ms`], and [`Clock::sleep_ms`] on the rig clock
//!   advances virtual time in place. Tests drive this deterministically
//!   from a single thread.
//! - **Real-time** ([`SimRig::new_realtime`]): [`Clock::sleep_ms`]
//!   blocks on the wall clock and never touches virtual time; an
//!   external pump thread is the only writer of virtual time, advancing
//!   it in step with real elapsed time. The deployed binary runs this
//!   mode so a direction-change delay takes real milliseconds and the
//!   other axes keep their pulse cadence.
//!
//! Due timer matches always fire in event order.

mod engine;
mod pins;

pub use engine::SimEngine;
pub use pins::{SimDirPin, SimEncoder, SimRelay, SimStepPin};

use std::sync::Arc;

use crate::clock::Clock;
use crate::io::{IrqHandler, PulseTimer};

/// Simulated match-mode timer bound to one engine slot.
pub struct SimTimer {
    engine: Arc<SimEngine>,
    id: usize,
}

impl PulseTimer for SimTimer {
    fn set_freq(&self, hz: u32) {
        self.engine.timer_set_freq(self.id, hz);
    }

    fn start(&self) {
        self.engine.timer_start(self.id);
    }

    fn stop(&self) {
        self.engine.timer_stop(self.id);
    }

    fn is_running(&self) -> bool {
        self.engine.timer_is_running(self.id)
    }

    fn set_match_handler(&self, handler: IrqHandler) {
        self.engine.timer_set_handler(self.id, handler);
    }
}

/// Virtual clock backed by the engine.
pub struct SimClock {
    engine: Arc<SimEngine>,
    realtime: bool,
}

impl Clock for SimClock {
    fn now_ms(&self) -> i64 {
        self.engine.now_us() / 1000
    }

    /// Manual mode advances virtual time in place. Real-time mode
    /// blocks on the wall clock and leaves virtual time to the pump, so
    /// a sleeping task cannot teleport the shared engine forward.
    fn sleep_ms(&self, ms: u64) {
        if self.realtime {
            std::thread::sleep(std::time::Duration::from_millis(ms));
        } else {
            self.engine.advance_us(ms as i64 * 1000);
        }
    }
}

/// Simulated peripherals of one axis.
pub struct SimAxisIo {
    pub step: Arc<SimStepPin>,
    pub dir: Arc<SimDirPin>,
    pub timer: Arc<SimTimer>,
    pub encoder: Arc<SimEncoder>,
}

/// A complete simulated rig: N axes, relay, virtual clock.
pub struct SimRig {
    engine: Arc<SimEngine>,
    clock: Arc<SimClock>,
    relay: Arc<SimRelay>,
    axes: Vec<SimAxisIo>,
}

impl SimRig {
    /// Manual-mode rig: the caller owns time via [`SimRig::advance_ms`].
    pub fn new(n_axes: usize) -> Self {
        Self::with_mode(n_axes, false)
    }

    /// Real-time rig: sleeping blocks the wall clock, and a pump thread
    /// calling [`SimRig::advance_ms`] is the only writer of virtual
    /// time.
    pub fn new_realtime(n_axes: usize) -> Self {
        Self::with_mode(n_axes, true)
    }

    fn with_mode(n_axes: usize, realtime: bool) -> Self {
        let engine = Arc::new(SimEngine::new());
        let axes = (0..n_axes)
            .map(|_| {
                let encoder = Arc::new(SimEncoder::new());
                SimAxisIo {
                    step: Arc::new(SimStepPin::new(encoder.clone())),
                    dir: Arc::new(SimDirPin::new()),
                    timer: Arc::new(SimTimer {
                        engine: engine.clone(),
                        id: engine.register_timer(),
                    }),
                    encoder,
                }
            })
            .collect();
        Self {
            clock: Arc::new(SimClock {
                engine: engine.clone(),
                realtime,
            }),
            relay: Arc::new(SimRelay::new()),
            engine,
            axes,
        }
    }

    pub fn axis(&self, i: usize) -> &SimAxisIo {
        &self.axes[i]
    }

    pub fn clock(&self) -> Arc<SimClock> {
        self.clock.clone()
    }

    pub fn relay(&self) -> Arc<SimRelay> {
        self.relay.clone()
    }

    pub fn now_ms(&self) -> i64 {
        self.engine.now_us() / 1000
    }

    /// Advance virtual time, firing due timer matches and encoder edges.
    pub fn advance_ms(&self, ms: u64) {
        self.engine.advance_us(ms as i64 * 1000);
    }

    /// Jam or free the motor of axis `i`.
    pub fn jam(&self, i: usize, jammed: bool) {
        self.axes[i].encoder.set_jammed(jammed);
    }

    /// Step-pin toggles emitted on axis `i` so far.
    pub fn toggles(&self, i: usize) -> u64 {
        self.axes[i].step.toggles()
    }

    /// Encoder edges produced on axis `i` so far.
    pub fn encoder_edges(&self, i: usize) -> u64 {
        self.axes[i].encoder.edges()
    }

    /// Observed pulse-timer stop → start gaps on axis `i` [ms].
    pub fn timer_gaps_ms(&self, i: usize) -> Vec<i64> {
        self.engine
            .timer_gaps_us(self.axes[i].timer.id)
            .into_iter()
            .map(|us| us / 1000)
            .collect()
    }
}
