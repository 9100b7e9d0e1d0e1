//! TOML configuration loader with validation.
//!
//! Loads the [`SystemConfig`] (server settings plus one `[[axis]]` table
//! per axis) and validates parameter bounds before anything is wired to
//! hardware. The defaults reproduce a three-axis rig with 1000 counts
//! per inch and the stock controller tunings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    DEFAULT_ABS_MIN_OUT, DEFAULT_COUNTS_PER_INCH, DEFAULT_KP, DEFAULT_MAX_OUT, DEFAULT_MIN_OUT,
    DEFAULT_PORT, DEFAULT_STEP_TIME_MS, MAX_AXES, MAX_FREQ,
};

/// Configuration loading/validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config validation: {0}")]
    Validation(String),
}

// ─── Config Structs ─────────────────────────────────────────────────

/// Proportional controller tunings for one axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Proportional gain.
    pub kp: i32,
    /// Supervisor update period [ms].
    pub update_ms: u32,
    /// Output floor [Hz, signed].
    pub min_out: i32,
    /// Output ceiling [Hz, signed].
    pub max_out: i32,
    /// Absolute minimum output magnitude [Hz].
    pub abs_min_out: i32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kp: DEFAULT_KP,
            update_ms: DEFAULT_STEP_TIME_MS,
            min_out: DEFAULT_MIN_OUT,
            max_out: DEFAULT_MAX_OUT,
            abs_min_out: DEFAULT_ABS_MIN_OUT,
        }
    }
}

/// Static configuration of one axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Short identifier used in logs and on the wire ("x", "y", "z").
    pub name: String,
    /// Inverts the output-sign → rotation and direction → count mappings.
    #[serde(default)]
    pub reversed: bool,
    /// Setpoint-unit to encoder-count conversion factor.
    #[serde(default = "default_counts")]
    pub counts_per_inch: i32,
    #[serde(default)]
    pub controller: ControllerConfig,
}

fn default_counts() -> i32 {
    DEFAULT_COUNTS_PER_INCH
}

/// TCP command server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Complete system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "axis")]
    pub axes: Vec<AxisConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            axes: ["x", "y", "z"]
                .into_iter()
                .map(|name| AxisConfig {
                    name: name.to_string(),
                    reversed: false,
                    counts_per_inch: DEFAULT_COUNTS_PER_INCH,
                    controller: ControllerConfig::default(),
                })
                .collect(),
        }
    }
}

// ─── Loading & Validation ───────────────────────────────────────────

impl SystemConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
        let config: Self =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when it exists, otherwise fall back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate axis count, name uniqueness and per-axis parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axes.is_empty() || self.axes.len() > MAX_AXES {
            return Err(ConfigError::Validation(format!(
                "axis count {} outside 1..={MAX_AXES}",
                self.axes.len()
            )));
        }
        for (i, a) in self.axes.iter().enumerate() {
            if a.name.is_empty() {
                return Err(ConfigError::Validation(format!("axis {i}: empty name")));
            }
            if self.axes[..i].iter().any(|b| b.name == a.name) {
                return Err(ConfigError::Validation(format!(
                    "duplicate axis name {:?}",
                    a.name
                )));
            }
            if a.counts_per_inch <= 0 {
                return Err(ConfigError::Validation(format!(
                    "axis {:?}: counts_per_inch must be positive",
                    a.name
                )));
            }
            let c = &a.controller;
            if c.kp <= 0 {
                return Err(ConfigError::Validation(format!(
                    "axis {:?}: kp must be positive",
                    a.name
                )));
            }
            if c.update_ms == 0 {
                return Err(ConfigError::Validation(format!(
                    "axis {:?}: update_ms must be positive",
                    a.name
                )));
            }
            if c.min_out >= 0 || c.max_out <= 0 {
                return Err(ConfigError::Validation(format!(
                    "axis {:?}: output clamp must straddle zero",
                    a.name
                )));
            }
            if c.abs_min_out <= 0 || c.abs_min_out > c.max_out {
                return Err(ConfigError::Validation(format!(
                    "axis {:?}: abs_min_out must be in 1..=max_out",
                    a.name
                )));
            }
            if c.max_out >= MAX_FREQ as i32 {
                return Err(ConfigError::Validation(format!(
                    "axis {:?}: max_out {} must stay below {MAX_FREQ}",
                    a.name, c.max_out
                )));
            }
        }
        Ok(())
    }
}
