//! System-wide constants for the triax workspace.
//!
//! Single source of truth for motion limits, control thresholds and
//! defaults. Imported by all crates, with no duplication permitted.

use static_assertions::const_assert;

/// Maximum number of axes.
pub const MAX_AXES: usize = 3;

/// Exclusive upper bound on any commanded pulse frequency [Hz].
pub const MAX_FREQ: u32 = 125_000;

/// Mandatory timer-stopped delay between reversed motions [ms].
pub const DIR_CHANGE_DELAY_MS: u64 = 500;

/// Closed-loop arrival window checked by the command task [counts].
pub const POS_THRESHOLD: i32 = 10;

/// Closed-loop arrival window checked by the pulse handler [counts].
///
/// Tighter than [`POS_THRESHOLD`] so the pulse handler halts on the exact
/// count even if the supervisor has not yet observed arrival.
pub const EXACT_STOP_THRESHOLD: i32 = 2;

/// Minimum encoder progress per supervisor wake [counts].
pub const STALL_THRESHOLD: i32 = 5;

/// Qualifying supervisor wakes before the stall latch trips.
pub const STALL_MAX_COUNT: u32 = 10;

/// Default supervisor update period [ms], reset on every command.
pub const DEFAULT_STEP_TIME_MS: u32 = 100;

/// Per-axis command queue depth.
pub const COMMAND_QUEUE_DEPTH: usize = 5;

/// Captured-log ring depth for the LOGS command.
pub const LOG_QUEUE_DEPTH: usize = 128;

/// Wire protocol version string.
pub const PROTOCOL_VERSION: &str = "JSON_1.0";

/// Default TCP command port.
pub const DEFAULT_PORT: u16 = 5020;

/// Default proportional gain.
pub const DEFAULT_KP: i32 = 100;

/// Default controller output floor [Hz, signed].
pub const DEFAULT_MIN_OUT: i32 = -100_000;

/// Default controller output ceiling [Hz, signed].
pub const DEFAULT_MAX_OUT: i32 = 100_000;

/// Default absolute minimum controller output [Hz].
///
/// Outputs below this magnitude are pushed up so the motor does not stall
/// at near-zero drive.
pub const DEFAULT_ABS_MIN_OUT: i32 = 10_000;

/// Default setpoint-unit to encoder-count conversion factor.
pub const DEFAULT_COUNTS_PER_INCH: i32 = 1000;

// A running timer must always satisfy requested_freq < MAX_FREQ, so the
// default clamp has to stay below it.
const_assert!(DEFAULT_MAX_OUT < MAX_FREQ as i32);
const_assert!(DEFAULT_ABS_MIN_OUT <= DEFAULT_MAX_OUT);
const_assert!(DEFAULT_MIN_OUT < 0);
const_assert!(EXACT_STOP_THRESHOLD < POS_THRESHOLD);
