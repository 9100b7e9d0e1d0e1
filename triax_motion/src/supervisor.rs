//! Axis supervision: stall detection and the periodic control update.
//!
//! The supervisor never emits pulses itself; it only reparameterizes the
//! pulse timer. It is woken by [`SupervisorSignal`], which the pulse
//! handler gives at most once per `step_time` period (and once on
//! arrival).

use std::sync::{Condvar, Mutex};

use tracing::{debug, info, warn};

use triax_common::consts::{STALL_MAX_COUNT, STALL_THRESHOLD};
use triax_common::types::{Direction, MotionKind};

use crate::axis::Axis;
use crate::flags::SystemFlags;

/// Binary give/take signal crossing the interrupt/task boundary.
///
/// Multiple gives before a take collapse into one, like a binary
/// semaphore.
pub struct SupervisorSignal {
    pending: Mutex<bool>,
    cv: Condvar,
}

impl SupervisorSignal {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Give the signal. Safe to call from interrupt context; never
    /// blocks.
    pub fn give(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = true;
        self.cv.notify_one();
    }

    /// Block until the signal is given, then consume it.
    pub fn take(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while !*pending {
            pending = self
                .cv
                .wait(pending)
                .unwrap_or_else(|e| e.into_inner());
        }
        *pending = false;
    }

    /// Consume the signal if it is pending, without blocking.
    pub fn try_take(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let was = *pending;
        *pending = false;
        was
    }
}

impl Default for SupervisorSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Axis {
    /// One supervisor evaluation, run per signal wake.
    ///
    /// 1. Stall check: with stall detection enabled, no encoder progress
    ///    over [`STALL_MAX_COUNT`] consecutive wakes latches `stalled`,
    ///    stops the timer and drops global control (and with it the main
    ///    power relay).
    /// 2. Arrival: a latched `already_there` ends the evaluation.
    /// 3. Closed loop: recompute the control output and reprogram the
    ///    timer.
    pub fn supervise_once(&self, flags: &SystemFlags) {
        if flags.stall_detection() {
            let progress = self.pos_act() - self.last_pos();
            if progress.abs() < STALL_THRESHOLD {
                let count = {
                    let mut ctl = self.ctl();
                    ctl.stalled_counter += 1;
                    ctl.stalled_counter
                };
                if count >= STALL_MAX_COUNT {
                    self.latch_stalled();
                    self.hw().timer.stop();
                    warn!("{}: stalled", self.name());
                    flags.set_control_enabled(false);
                    return;
                }
            } else {
                self.ctl().stalled_counter = 0;
            }
        }

        if self.is_already_there() {
            info!("{}: position reached", self.name());
            return;
        }

        if self.kind() == MotionKind::ClosedLoop {
            let target = self.pos_cmd();
            let pos = self.pos_act();
            let (out, progress) = {
                let mut ctl = self.ctl();
                let out = ctl.kp.run(target, pos);
                (out, ctl.kp.last_delta())
            };
            debug!(
                "{}: control output = {}, progress = {}",
                self.name(),
                out,
                progress
            );

            let direction = Direction::from_output(out, self.reversed());
            self.direction_change_guard(direction);
            self.set_direction(direction);
            self.ctl().requested_freq = out.unsigned_abs();
            self.restart_timer();
        }
    }
}
