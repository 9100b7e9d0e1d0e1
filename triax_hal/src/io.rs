//! Hardware capability traits.
//!
//! All methods take `&self`; implementations are expected to be cheap
//! interior-mutability wrappers over registers (or atomics, for the
//! simulation driver), safe to call from interrupt context.

use std::sync::Arc;

use triax_common::types::Direction;

/// Callback invoked from interrupt context. Must not block.
pub type IrqHandler = Arc<dyn Fn() + Send + Sync>;

/// Step output pin of a stepper driver.
///
/// Two consecutive toggles make one full motor step; the drive counts
/// edges.
pub trait StepPin: Send + Sync {
    fn toggle(&self);
}

/// Direction output pin of a stepper driver.
///
/// Only written while the axis pulse timer is stopped.
pub trait DirPin: Send + Sync {
    fn set(&self, dir: Direction);
}

/// Match-mode hardware timer generating step edges.
///
/// The timer fires its match handler once per step edge, i.e. at twice
/// the programmed pulse frequency. `start` and `stop` are idempotent in
/// observable effect. `set_freq` must only be called while the timer is
/// stopped; the motion state machine always stops first.
pub trait PulseTimer: Send + Sync {
    /// Program the full-pulse frequency [Hz].
    fn set_freq(&self, hz: u32);
    fn start(&self);
    fn stop(&self);
    fn is_running(&self) -> bool;
    /// Install the match handler invoked once per step edge.
    fn set_match_handler(&self, handler: IrqHandler);
}

/// Falling-edge encoder input of one axis.
pub trait EncoderInput: Send + Sync {
    /// Install the edge handler invoked once per falling edge.
    fn set_edge_handler(&self, handler: IrqHandler);
}

/// Main power relay.
pub trait Relay: Send + Sync {
    fn set(&self, on: bool);
    fn is_on(&self) -> bool;
}
