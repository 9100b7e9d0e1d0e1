//! Core types shared across the triax workspace.
//!
//! Axis identifiers, rotation directions, motion modes, the per-axis
//! command message and the telemetry snapshot.

use serde::{Deserialize, Serialize};

/// Identifier of one physical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AxisId {
    X = 0,
    Y = 1,
    Z = 2,
}

impl AxisId {
    /// All axes, in queue/config order.
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    /// Parse a wire axis designator. Accepts `"x"`, `"X"`, `"y"`, ….
    pub fn parse(s: &str) -> Option<Self> {
        match s.chars().next()? {
            'x' | 'X' => Some(Self::X),
            'y' | 'Y' => Some(Self::Y),
            'z' | 'Z' => Some(Self::Z),
            _ => None,
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        }
    }
}

/// Rotation direction of an axis motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Direction {
    Cw = 0,
    Ccw = 1,
}

impl Direction {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Cw),
            1 => Some(Self::Ccw),
            _ => None,
        }
    }

    /// Parse a wire direction designator (`"CW"` / `"CCW"`).
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "CW" => Some(Self::Cw),
            "CCW" => Some(Self::Ccw),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cw => "CW",
            Self::Ccw => "CCW",
        }
    }

    /// Direction of rotation for a signed control output.
    ///
    /// Positive output drives CW, negative CCW; a reversed axis inverts
    /// the mapping.
    #[inline]
    pub const fn from_output(out: i32, reversed: bool) -> Self {
        if reversed {
            if out < 0 { Self::Cw } else { Self::Ccw }
        } else {
            if out < 0 { Self::Ccw } else { Self::Cw }
        }
    }

    /// Encoder count increment contributed by one edge in this direction.
    #[inline]
    pub const fn encoder_delta(self, reversed: bool) -> i32 {
        let d = match self {
            Self::Cw => 1,
            Self::Ccw => -1,
        };
        if reversed { -d } else { d }
    }
}

/// Motion mode of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum MotionKind {
    /// No motion; the pulse timer is stopped.
    Stop = 0,
    /// Open-loop constant-frequency motion in a fixed direction.
    FreeRunning = 1,
    /// Proportional positioning toward a target encoder count.
    ClosedLoop = 2,
}

impl MotionKind {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Stop),
            1 => Some(Self::FreeRunning),
            2 => Some(Self::ClosedLoop),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "STOP",
            Self::FreeRunning => "FREE_RUNNING",
            Self::ClosedLoop => "CLOSED_LOOP",
        }
    }
}

/// One message on an axis command queue.
///
/// Owned by the sender until enqueued, then moved to the command task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AxisCommand {
    /// Spin at `speed_hz` in `direction` until told otherwise.
    FreeRun {
        direction: Direction,
        speed_hz: u32,
    },
    /// Drive to `setpoint` user units under proportional control.
    ClosedLoop { setpoint: f64 },
    /// Stop any motion in progress.
    Stop,
}

/// Wire-shaped per-axis telemetry snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AxisSnapshot {
    /// Axis name, used as the enclosing key (not serialized itself).
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MotionKind,
    pub dir: Direction,
    /// Corrected position in user units: `(pos_act - offset) / factor`.
    #[serde(rename = "posAct")]
    pub pos_user: f64,
    /// Target position [counts].
    #[serde(rename = "posCmd")]
    pub pos_cmd: i32,
    pub stalled: bool,
    pub offset: i32,
}
