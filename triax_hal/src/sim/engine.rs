//! Virtual-time event engine for the simulation driver.
//!
//! Time only moves when [`SimEngine::advance_us`] is called. Due timer
//! matches are fired in time order with the engine lock released, so
//! match handlers may freely call back into timer operations.

use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use crate::io::IrqHandler;

struct TimerSlot {
    running: bool,
    /// Microseconds between step edges (half the pulse period); 0 when
    /// the timer has not been programmed yet.
    period_us: i64,
    next_fire_us: i64,
    handler: Option<IrqHandler>,
    /// Set on a running → stopped transition, consumed by the next start.
    last_stop_us: Option<i64>,
    /// Observed stop → start gaps [µs].
    gaps_us: Vec<i64>,
}

struct EngineInner {
    now_us: i64,
    timers: Vec<TimerSlot>,
}

/// Shared virtual-time core of one simulated rig.
pub struct SimEngine {
    inner: Mutex<EngineInner>,
}

impl SimEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                now_us: 0,
                timers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn register_timer(&self) -> usize {
        let mut inner = self.lock();
        inner.timers.push(TimerSlot {
            running: false,
            period_us: 0,
            next_fire_us: 0,
            handler: None,
            last_stop_us: None,
            gaps_us: Vec::new(),
        });
        inner.timers.len() - 1
    }

    pub fn now_us(&self) -> i64 {
        self.lock().now_us
    }

    /// Advance virtual time, firing every due timer match in time order.
    pub fn advance_us(&self, dt_us: i64) {
        let target = self.lock().now_us + dt_us;
        loop {
            let fired = {
                let mut inner = self.lock();
                let due = inner
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.running && t.period_us > 0 && t.next_fire_us <= target)
                    .min_by_key(|(_, t)| t.next_fire_us)
                    .map(|(i, _)| i);
                match due {
                    None => {
                        if inner.now_us < target {
                            inner.now_us = target;
                        }
                        return;
                    }
                    Some(i) => {
                        let t = &mut inner.timers[i];
                        let fire = t.next_fire_us;
                        t.next_fire_us = fire + t.period_us;
                        let handler = t.handler.clone();
                        if inner.now_us < fire {
                            inner.now_us = fire;
                        }
                        handler
                    }
                }
            };
            if let Some(handler) = fired {
                handler();
            }
        }
    }

    // ─── Timer Operations ───────────────────────────────────────────

    pub(crate) fn timer_set_freq(&self, id: usize, hz: u32) {
        let mut inner = self.lock();
        let t = &mut inner.timers[id];
        t.period_us = if hz == 0 {
            0
        } else {
            (1_000_000 / (2 * i64::from(hz))).max(1)
        };
    }

    pub(crate) fn timer_start(&self, id: usize) {
        let mut inner = self.lock();
        let now = inner.now_us;
        let t = &mut inner.timers[id];
        if !t.running {
            t.running = true;
            t.next_fire_us = now + t.period_us;
            if let Some(stopped_at) = t.last_stop_us.take() {
                t.gaps_us.push(now - stopped_at);
            }
            trace!("sim timer {id}: started at {now}µs, period {}µs", t.period_us);
        }
    }

    pub(crate) fn timer_stop(&self, id: usize) {
        let mut inner = self.lock();
        let now = inner.now_us;
        let t = &mut inner.timers[id];
        if t.running {
            t.running = false;
            t.last_stop_us = Some(now);
            trace!("sim timer {id}: stopped at {now}µs");
        }
    }

    pub(crate) fn timer_is_running(&self, id: usize) -> bool {
        self.lock().timers[id].running
    }

    pub(crate) fn timer_set_handler(&self, id: usize, handler: IrqHandler) {
        self.lock().timers[id].handler = Some(handler);
    }

    pub(crate) fn timer_gaps_us(&self, id: usize) -> Vec<i64> {
        self.lock().timers[id].gaps_us.clone()
    }
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}
