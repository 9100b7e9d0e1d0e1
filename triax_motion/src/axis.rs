//! Per-axis motion state machine.
//!
//! One [`Axis`] owns the motion state of a single motor + encoder +
//! driver combination. Its methods are the bodies of the three
//! execution contexts:
//!
//! - [`Axis::handle`]: the command task body, dispatching one queue message.
//! - [`Axis::on_pulse`]: the pulse timer match handler (interrupt context).
//! - [`Axis::on_encoder_edge`]: the encoder edge handler (interrupt
//!   context), the only writer of `pos_act`.
//! - [`Axis::supervise_once`]: the supervisor body, in [`crate::supervisor`].
//!
//! ## Ownership split
//!
//! Words the interrupt context reads (`kind`, `dir`, `pos_cmd`,
//! `step_time_ms`) are plain atomics mutated only while the pulse timer
//! is stopped, so a running match handler always sees a consistent
//! snapshot. `pos_act` belongs to the encoder handler, `last_pos` and
//! `ticks_last_ms` to the pulse handler. `already_there` and `stalled`
//! are latches written from both sides; the pulse handler's write is
//! final. Everything only the tasks touch lives under one mutex.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use triax_common::config::AxisConfig;
use triax_common::consts::{
    DEFAULT_STEP_TIME_MS, DIR_CHANGE_DELAY_MS, EXACT_STOP_THRESHOLD, MAX_FREQ, POS_THRESHOLD,
};
use triax_common::types::{AxisCommand, AxisSnapshot, Direction, MotionKind};
use triax_hal::{Clock, DirPin, EncoderInput, PulseTimer, StepPin};

use crate::kp::{PControl, Tunings};
use crate::supervisor::SupervisorSignal;

/// Hardware bindings of one axis.
pub struct AxisHardware {
    pub step: Arc<dyn StepPin>,
    pub dir: Arc<dyn DirPin>,
    pub timer: Arc<dyn PulseTimer>,
    pub encoder: Arc<dyn EncoderInput>,
    pub clock: Arc<dyn Clock>,
}

/// State touched only from task context.
pub(crate) struct CtlState {
    pub(crate) kp: PControl,
    pub(crate) stalled_counter: u32,
    /// Current pulse frequency [Hz] while the timer is running.
    pub(crate) requested_freq: u32,
    /// User-assignable zero offset for reporting [counts].
    pub(crate) offset: i32,
}

/// One motor + encoder + driver combination under independent control.
pub struct Axis {
    name: String,
    reversed: bool,
    counts_per_unit: i32,
    hw: AxisHardware,

    /// Motion mode, as a [`MotionKind`] discriminant.
    kind: AtomicU8,
    /// Last commanded direction, as a [`Direction`] discriminant.
    dir: AtomicU8,
    /// Target encoder count (closed loop only).
    pos_cmd: AtomicI32,
    /// Current encoder count; written only by [`Axis::on_encoder_edge`]
    /// (and by calibration between commands).
    pos_act: AtomicI32,
    /// Position snapshot taken by the pulse handler, read by the stall
    /// detector.
    last_pos: AtomicI32,
    /// Arrival latch; once the pulse handler sets it, tasks only clear
    /// it on the next command.
    already_there: AtomicBool,
    /// Stall latch.
    stalled: AtomicBool,
    /// Supervisor re-evaluation period [ms].
    step_time_ms: AtomicU32,
    /// Tick at which the pulse handler last woke the supervisor.
    ticks_last_ms: AtomicI64,

    ctl: Mutex<CtlState>,
    signal: SupervisorSignal,
}

impl Axis {
    /// Build an axis and install its interrupt handlers on the hardware.
    pub fn attach(config: &AxisConfig, hw: AxisHardware) -> Arc<Self> {
        let axis = Arc::new(Self {
            name: config.name.clone(),
            reversed: config.reversed,
            counts_per_unit: config.counts_per_inch,
            kind: AtomicU8::new(MotionKind::Stop as u8),
            dir: AtomicU8::new(Direction::Cw as u8),
            pos_cmd: AtomicI32::new(0),
            pos_act: AtomicI32::new(0),
            last_pos: AtomicI32::new(0),
            already_there: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
            step_time_ms: AtomicU32::new(DEFAULT_STEP_TIME_MS),
            ticks_last_ms: AtomicI64::new(0),
            ctl: Mutex::new(CtlState {
                kp: PControl::new(Tunings::from(&config.controller)),
                stalled_counter: 0,
                requested_freq: 0,
                offset: 0,
            }),
            signal: SupervisorSignal::new(),
            hw,
        });

        let pulse = axis.clone();
        axis.hw
            .timer
            .set_match_handler(Arc::new(move || pulse.on_pulse()));
        let edge = axis.clone();
        axis.hw
            .encoder
            .set_edge_handler(Arc::new(move || edge.on_encoder_edge()));
        axis
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> MotionKind {
        MotionKind::from_u8(self.kind.load(Ordering::Acquire)).unwrap_or(MotionKind::Stop)
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        Direction::from_u8(self.dir.load(Ordering::Acquire)).unwrap_or(Direction::Cw)
    }

    #[inline]
    pub fn pos_act(&self) -> i32 {
        self.pos_act.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pos_cmd(&self) -> i32 {
        self.pos_cmd.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_already_there(&self) -> bool {
        self.already_there.load(Ordering::Acquire)
    }

    pub fn supervisor_signal(&self) -> &SupervisorSignal {
        &self.signal
    }

    pub(crate) fn reversed(&self) -> bool {
        self.reversed
    }

    pub(crate) fn last_pos(&self) -> i32 {
        self.last_pos.load(Ordering::Relaxed)
    }

    pub(crate) fn latch_stalled(&self) {
        self.stalled.store(true, Ordering::Release);
    }

    pub(crate) fn hw(&self) -> &AxisHardware {
        &self.hw
    }

    pub(crate) fn ctl(&self) -> MutexGuard<'_, CtlState> {
        self.ctl.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Command task ───────────────────────────────────────────────

    /// Dispatch one dequeued command message.
    ///
    /// Every message clears the stall and arrival latches and resets the
    /// supervisor period before dispatch; a fresh command is always
    /// assumed not-stalled.
    pub fn handle(&self, msg: AxisCommand) {
        info!("{}: command received", self.name);
        self.stalled.store(false, Ordering::Release);
        self.already_there.store(false, Ordering::Release);
        self.step_time_ms
            .store(DEFAULT_STEP_TIME_MS, Ordering::Release);
        self.ctl().stalled_counter = 0;

        match msg {
            AxisCommand::FreeRun {
                direction,
                speed_hz,
            } => self.move_free_run(direction, speed_hz),
            AxisCommand::ClosedLoop { setpoint } => {
                let target = (setpoint * f64::from(self.counts_per_unit)).round() as i32;
                self.move_closed_loop(target);
            }
            AxisCommand::Stop => self.stop(),
        }
    }

    /// Start a free-run movement, if the speed is in bounds.
    fn move_free_run(&self, direction: Direction, speed_hz: u32) {
        if speed_hz >= MAX_FREQ {
            warn!("{}: chosen speed out of bounds {}", self.name, speed_hz);
            return;
        }

        self.direction_change_guard(direction);

        self.kind
            .store(MotionKind::FreeRunning as u8, Ordering::Release);
        self.set_direction(direction);
        self.ctl().requested_freq = speed_hz;
        self.restart_timer();
        info!(
            "{}: FREE RUN, speed: {}, direction: {}",
            self.name,
            speed_hz,
            direction.as_str()
        );
    }

    /// Start a closed-loop movement toward `target` counts.
    fn move_closed_loop(&self, target: i32) {
        self.pos_cmd.store(target, Ordering::Release);
        let pos = self.pos_act();
        info!(
            "{}: CLOSED LOOP, posCmd: {} posAct: {}",
            self.name, target, pos
        );

        let error = target - pos;
        if error.abs() < POS_THRESHOLD {
            self.already_there.store(true, Ordering::Release);
            self.hw.timer.stop();
            info!("{}: already there", self.name);
            return;
        }

        let out = {
            let mut ctl = self.ctl();
            ctl.kp.restart(pos);
            ctl.kp.run(target, pos)
        };
        let direction = Direction::from_output(out, self.reversed);
        self.direction_change_guard(direction);

        self.kind
            .store(MotionKind::ClosedLoop as u8, Ordering::Release);
        self.set_direction(direction);
        self.ctl().requested_freq = out.unsigned_abs();
        self.restart_timer();
    }

    /// Stop any movement in progress.
    pub fn stop(&self) {
        self.kind.store(MotionKind::Stop as u8, Ordering::Release);
        self.hw.timer.stop();
        info!("{}: STOP", self.name);
    }

    // ─── Interrupt context ──────────────────────────────────────────

    /// Pulse timer match handler: emit one step edge.
    pub fn on_pulse(&self) {
        if self.kind() == MotionKind::ClosedLoop {
            let error = self.pos_cmd.load(Ordering::Acquire) - self.pos_act.load(Ordering::Relaxed);
            // Halt on the exact count even if the supervisor has not yet
            // observed arrival.
            self.already_there
                .store(error.abs() < EXACT_STOP_THRESHOLD, Ordering::Release);
        }

        if self.already_there.load(Ordering::Acquire) {
            self.kind.store(MotionKind::Stop as u8, Ordering::Release);
            self.hw.timer.stop();
            self.signal.give();
            self.last_pos
                .store(self.pos_act.load(Ordering::Relaxed), Ordering::Relaxed);
            return;
        }

        self.hw.step.toggle();

        let now = self.hw.clock.now_ms();
        if now - self.ticks_last_ms.load(Ordering::Relaxed)
            > i64::from(self.step_time_ms.load(Ordering::Acquire))
        {
            self.ticks_last_ms.store(now, Ordering::Relaxed);
            self.signal.give();
        }

        self.last_pos
            .store(self.pos_act.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Encoder edge handler: integrate one count in the commanded
    /// direction.
    ///
    /// Single-quadrature: the count direction is inferred from the last
    /// commanded direction, not from a second channel.
    pub fn on_encoder_edge(&self) {
        let delta = self.direction().encoder_delta(self.reversed);
        self.pos_act.fetch_add(delta, Ordering::Relaxed);
    }

    // ─── Shared helpers ─────────────────────────────────────────────

    /// Direction-change guard: when reversing a non-stopped axis, hold
    /// the timer stopped for [`DIR_CHANGE_DELAY_MS`] before restart.
    pub(crate) fn direction_change_guard(&self, new_dir: Direction) {
        if self.direction() != new_dir && self.kind() != MotionKind::Stop {
            self.hw.timer.stop();
            self.hw.clock.sleep_ms(DIR_CHANGE_DELAY_MS);
        }
    }

    /// Record the direction and drive the direction output.
    ///
    /// Only called while the pulse timer is stopped.
    pub(crate) fn set_direction(&self, dir: Direction) {
        self.dir.store(dir as u8, Ordering::Release);
        self.hw.dir.set(dir);
    }

    /// Reprogram the pulse timer from the requested frequency:
    /// stop → set_freq → start.
    ///
    /// A zero frequency leaves the timer stopped; no pulses are emitted.
    pub(crate) fn restart_timer(&self) {
        let freq_hz = self.ctl().requested_freq;
        self.hw.timer.stop();
        if freq_hz == 0 {
            return;
        }
        self.hw.timer.set_freq(freq_hz);
        self.hw.timer.start();
    }

    // ─── External adjustments ───────────────────────────────────────

    /// Re-initialise the controller and adopt its update period as the
    /// supervisor period.
    pub fn set_tunings(&self, tunings: Tunings) {
        let mut ctl = self.ctl();
        self.step_time_ms.store(tunings.update_ms, Ordering::Release);
        ctl.kp = PControl::new(tunings);
        info!("{}: controller tunings set", self.name);
    }

    /// Calibrate the actual position to `pos` user units.
    ///
    /// Only issued between commands; the axis is expected to be at rest.
    pub fn set_position(&self, pos: f64) {
        let counts = (pos * f64::from(self.counts_per_unit)).round() as i32;
        self.pos_act.store(counts, Ordering::Relaxed);
    }

    /// Assign the reporting zero offset [counts].
    pub fn set_offset(&self, offset: i32) {
        self.ctl().offset = offset;
    }

    /// Wire-shaped telemetry snapshot.
    pub fn snapshot(&self) -> AxisSnapshot {
        let offset = self.ctl().offset;
        let pos = self.pos_act();
        AxisSnapshot {
            name: self.name.clone(),
            kind: self.kind(),
            dir: self.direction(),
            pos_user: f64::from(pos - offset) / f64::from(self.counts_per_unit),
            pos_cmd: self.pos_cmd(),
            stalled: self.is_stalled(),
            offset,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
