//! Simulated pins, encoder and relay.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use triax_common::types::Direction;

use crate::io::{DirPin, EncoderInput, IrqHandler, Relay, StepPin};

/// Simulated incremental encoder channel.
///
/// Wired to the step pin of the same axis: one falling edge per full
/// step, unless the motor is jammed.
pub struct SimEncoder {
    handler: Mutex<Option<IrqHandler>>,
    jammed: AtomicBool,
    edges: AtomicU64,
}

impl SimEncoder {
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
            jammed: AtomicBool::new(false),
            edges: AtomicU64::new(0),
        }
    }

    /// Mechanically jam the motor: the shaft stops producing edges.
    pub fn set_jammed(&self, jammed: bool) {
        tracing::debug!("sim encoder: jammed = {jammed}");
        self.jammed.store(jammed, Ordering::Release);
    }

    pub fn edges(&self) -> u64 {
        self.edges.load(Ordering::Acquire)
    }

    pub(crate) fn pulse(&self) {
        if self.jammed.load(Ordering::Acquire) {
            return;
        }
        self.edges.fetch_add(1, Ordering::AcqRel);
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler();
        }
    }
}

impl EncoderInput for SimEncoder {
    fn set_edge_handler(&self, handler: IrqHandler) {
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }
}

impl Default for SimEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated step output pin, counting toggles for assertions.
pub struct SimStepPin {
    level: AtomicBool,
    toggles: AtomicU64,
    encoder: Arc<SimEncoder>,
}

impl SimStepPin {
    pub fn new(encoder: Arc<SimEncoder>) -> Self {
        Self {
            level: AtomicBool::new(false),
            toggles: AtomicU64::new(0),
            encoder,
        }
    }

    pub fn toggles(&self) -> u64 {
        self.toggles.load(Ordering::Acquire)
    }
}

impl StepPin for SimStepPin {
    fn toggle(&self) {
        let was_high = self.level.fetch_xor(true, Ordering::AcqRel);
        self.toggles.fetch_add(1, Ordering::AcqRel);
        if was_high {
            // High → low: the falling edge the encoder input reacts to.
            self.encoder.pulse();
        }
    }
}

/// Simulated direction output pin.
pub struct SimDirPin {
    dir: AtomicU8,
}

impl SimDirPin {
    pub fn new() -> Self {
        Self {
            dir: AtomicU8::new(Direction::Cw as u8),
        }
    }

    pub fn get(&self) -> Direction {
        Direction::from_u8(self.dir.load(Ordering::Acquire)).unwrap_or(Direction::Cw)
    }
}

impl DirPin for SimDirPin {
    fn set(&self, dir: Direction) {
        self.dir.store(dir as u8, Ordering::Release);
    }
}

impl Default for SimDirPin {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated main power relay.
pub struct SimRelay {
    on: AtomicBool,
}

impl SimRelay {
    pub fn new() -> Self {
        Self {
            on: AtomicBool::new(false),
        }
    }
}

impl Relay for SimRelay {
    fn set(&self, on: bool) {
        self.on.store(on, Ordering::Release);
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }
}

impl Default for SimRelay {
    fn default() -> Self {
        Self::new()
    }
}
