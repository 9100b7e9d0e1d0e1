//! Command-name dispatch over JSON parameters.
//!
//! Translates named commands into axis-queue messages or global flag
//! writes. Validation failures are returned synchronously as
//! `{"ACK": false, "ERROR": …}` and change no state; motion-level
//! rejections (over-speed free run) are handled by the command task
//! itself and still acknowledge here, matching the wire contract.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use triax_common::consts::PROTOCOL_VERSION;
use triax_common::types::{AxisCommand, AxisId, Direction};
use triax_motion::flags::SystemFlags;
use triax_motion::kp::{ControlAction, Tunings};
use triax_motion::tasks::AxisHandle;

use crate::logbuf::LogBuffer;

/// Synchronous command validation error.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no matching command found")]
    UnknownCommand,
    #[error("unknown axis: {0}")]
    UnknownAxis(String),
    #[error("missing or invalid parameter: {0}")]
    BadParameter(&'static str),
    #[error("invalid tunings: {0}")]
    BadTunings(&'static str),
    #[error("axis command queue closed")]
    QueueClosed,
}

/// Command surface over the axis handles and global flags.
pub struct Dispatcher {
    axes: Vec<AxisHandle>,
    flags: Arc<SystemFlags>,
    logs: LogBuffer,
}

impl Dispatcher {
    pub fn new(axes: Vec<AxisHandle>, flags: Arc<SystemFlags>, logs: LogBuffer) -> Self {
        Self { axes, flags, logs }
    }

    /// Execute one named command, turning validation errors into the
    /// wire error shape.
    pub fn execute(&self, command: &str, pars: Option<&Value>) -> Value {
        match self.dispatch(command, pars) {
            Ok(response) => response,
            Err(e) => {
                warn!("{command}: {e}");
                json!({ "ACK": false, "ERROR": e.to_string() })
            }
        }
    }

    fn dispatch(&self, command: &str, pars: Option<&Value>) -> Result<Value, CommandError> {
        match command {
            "PROTOCOL_VERSION" => Ok(json!({ "Version": PROTOCOL_VERSION })),
            "CONTROL_ENABLE" => Ok(self.control_enable(pars)),
            "STALL_CONTROL" => Ok(self.stall_control(pars)),
            "AXIS_FREE_RUN" => self.axis_free_run(pars),
            "AXIS_CLOSED_LOOP" => self.axis_closed_loop(pars),
            "AXIS_STOP" => self.axis_stop(pars),
            "AXIS_STOP_ALL" => self.axis_stop_all(),
            "KP_SET_TUNINGS" => self.kp_set_tunings(pars),
            "SET_CAL_POINT" => self.set_cal_point(pars),
            "TELEMETRIA" => Ok(self.telemetry()),
            "LOGS" => self.logs_cmd(pars),
            _ => Err(CommandError::UnknownCommand),
        }
    }

    // ─── Parameter helpers ──────────────────────────────────────────

    fn object(pars: Option<&Value>) -> Option<&Map<String, Value>> {
        pars?.as_object()
    }

    fn find_axis(&self, pars: Option<&Value>) -> Result<&AxisHandle, CommandError> {
        let name = Self::object(pars)
            .and_then(|o| o.get("axis"))
            .and_then(Value::as_str)
            .ok_or(CommandError::BadParameter("axis"))?;
        self.axis_by_id(AxisId::parse(name).ok_or_else(|| {
            CommandError::UnknownAxis(name.to_string())
        })?)
        .ok_or_else(|| CommandError::UnknownAxis(name.to_string()))
    }

    fn axis_by_id(&self, id: AxisId) -> Option<&AxisHandle> {
        self.axes
            .iter()
            .find(|h| AxisId::parse(h.axis().name()) == Some(id))
    }

    fn number(pars: Option<&Value>, key: &'static str) -> Result<f64, CommandError> {
        Self::object(pars)
            .and_then(|o| o.get(key))
            .and_then(Value::as_f64)
            .ok_or(CommandError::BadParameter(key))
    }

    // ─── Global flags ───────────────────────────────────────────────

    fn control_enable(&self, pars: Option<&Value>) -> Value {
        if let Some(enabled) = Self::object(pars)
            .and_then(|o| o.get("enabled"))
            .and_then(Value::as_bool)
        {
            self.flags.set_control_enabled(enabled);
        }
        json!({ "STATUS": self.flags.control_enabled() })
    }

    fn stall_control(&self, pars: Option<&Value>) -> Value {
        if let Some(enabled) = Self::object(pars)
            .and_then(|o| o.get("enabled"))
            .and_then(Value::as_bool)
        {
            self.flags.set_stall_detection(enabled);
        }
        json!({ "STATUS": self.flags.stall_detection() })
    }

    // ─── Axis motion ────────────────────────────────────────────────

    fn axis_free_run(&self, pars: Option<&Value>) -> Result<Value, CommandError> {
        let handle = self.find_axis(pars)?;
        let obj = Self::object(pars).ok_or(CommandError::BadParameter("pars"))?;

        let dir = obj.get("dir").and_then(Value::as_str);
        let speed = obj.get("speed").and_then(Value::as_f64).unwrap_or(0.0);
        // A missing direction or zero speed is ignored, not an error.
        let Some(dir) = dir else {
            return Ok(json!({ "ACK": true }));
        };
        if speed == 0.0 {
            return Ok(json!({ "ACK": true }));
        }
        if speed < 0.0 {
            return Err(CommandError::BadParameter("speed"));
        }
        let direction =
            Direction::from_wire(dir).ok_or(CommandError::BadParameter("dir"))?;
        let speed_hz = speed as u32;

        handle
            .send(AxisCommand::FreeRun {
                direction,
                speed_hz,
            })
            .map_err(|_| CommandError::QueueClosed)?;
        info!("AXIS_FREE_RUN DIR: {}, SPEED: {}", direction.as_str(), speed_hz);
        Ok(json!({ "ACK": true }))
    }

    fn axis_closed_loop(&self, pars: Option<&Value>) -> Result<Value, CommandError> {
        let handle = self.find_axis(pars)?;
        let setpoint = Self::number(pars, "setpoint")?;
        handle
            .send(AxisCommand::ClosedLoop { setpoint })
            .map_err(|_| CommandError::QueueClosed)?;
        Ok(json!({ "ACK": true }))
    }

    fn axis_stop(&self, pars: Option<&Value>) -> Result<Value, CommandError> {
        let handle = self.find_axis(pars)?;
        handle
            .send(AxisCommand::Stop)
            .map_err(|_| CommandError::QueueClosed)?;
        Ok(json!({ "ACK": true }))
    }

    fn axis_stop_all(&self) -> Result<Value, CommandError> {
        for handle in &self.axes {
            handle
                .send(AxisCommand::Stop)
                .map_err(|_| CommandError::QueueClosed)?;
        }
        Ok(json!({ "ACK": true }))
    }

    // ─── Tuning & calibration ───────────────────────────────────────

    fn kp_set_tunings(&self, pars: Option<&Value>) -> Result<Value, CommandError> {
        let handle = self.find_axis(pars)?;
        let tunings = Tunings {
            kp: Self::number(pars, "kp")? as i32,
            action: ControlAction::Direct,
            update_ms: Self::number(pars, "update")? as u32,
            min_out: Self::number(pars, "min")? as i32,
            max_out: Self::number(pars, "max")? as i32,
            abs_min_out: Self::number(pars, "abs_min")? as i32,
        };
        tunings.validate().map_err(CommandError::BadTunings)?;
        handle.axis().set_tunings(tunings);
        info!("{}: KP settings set", handle.axis().name());
        Ok(json!({ "ACK": true }))
    }

    fn set_cal_point(&self, pars: Option<&Value>) -> Result<Value, CommandError> {
        let pos_x = Self::number(pars, "position_x")?;
        let pos_y = Self::number(pars, "position_y")?;
        if let Some(handle) = self.axis_by_id(AxisId::X) {
            handle.axis().set_position(pos_x);
        }
        if let Some(handle) = self.axis_by_id(AxisId::Y) {
            handle.axis().set_position(pos_y);
        }
        Ok(json!({ "ACK": true }))
    }

    // ─── Reporting ──────────────────────────────────────────────────

    fn telemetry(&self) -> Value {
        let mut response = Map::new();
        for handle in &self.axes {
            let snapshot = handle.axis().snapshot();
            response.insert(
                snapshot.name.clone(),
                serde_json::to_value(&snapshot).unwrap_or(Value::Null),
            );
        }
        response.insert("control_enabled".into(), json!(self.flags.control_enabled()));
        response.insert("stall_detection".into(), json!(self.flags.stall_detection()));
        Value::Object(response)
    }

    fn logs_cmd(&self, pars: Option<&Value>) -> Result<Value, CommandError> {
        let quantity = Self::number(pars, "quantity")?;
        if quantity < 0.0 {
            return Err(CommandError::BadParameter("quantity"));
        }
        let lines = self.logs.drain(quantity as usize);
        Ok(json!({ "DEBUG_MSGS": lines }))
    }
}
