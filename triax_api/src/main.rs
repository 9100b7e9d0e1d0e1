//! # Triax Motion Controller
//!
//! Wires the configured axes onto the simulation driver, spawns the
//! per-axis command and supervisor tasks, bridges wall-clock time into
//! the rig and serves the JSON command protocol over TCP.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use triax_api::dispatch::Dispatcher;
use triax_api::logbuf::{LogBuffer, LogCaptureLayer};
use triax_api::server;
use triax_common::config::SystemConfig;
use triax_hal::SimRig;
use triax_motion::axis::{Axis, AxisHardware};
use triax_motion::flags::SystemFlags;
use triax_motion::{rt, tasks};

#[derive(Parser, Debug)]
#[command(name = "triax", about = "Three-axis stepper motion controller")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "triax.toml")]
    config: PathBuf,

    /// Override the configured TCP command port.
    #[arg(long)]
    port: Option<u16>,

    /// Simulation pump tick [ms].
    #[arg(long, default_value_t = 1)]
    tick_ms: u64,
}

fn main() {
    let args = Args::parse();

    let logs = LogBuffer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(LogCaptureLayer::new(logs.clone()))
        .init();

    if let Err(e) = run(args, logs) {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args, logs: LogBuffer) -> Result<(), Box<dyn std::error::Error>> {
    let config = SystemConfig::load_or_default(&args.config)?;
    info!(
        "configured axes: {}",
        config
            .axes
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if let Err(e) = rt::lock_memory() {
        warn!("{e}");
    }

    // Real-time rig: sleeping tasks block the wall clock; the pump
    // thread below is the only writer of virtual time.
    let rig = Arc::new(SimRig::new_realtime(config.axes.len()));
    let flags = Arc::new(SystemFlags::new(rig.relay()));

    let mut handles = Vec::new();
    for (i, axis_config) in config.axes.iter().enumerate() {
        let io = rig.axis(i);
        let axis = Axis::attach(
            axis_config,
            AxisHardware {
                step: io.step.clone(),
                dir: io.dir.clone(),
                timer: io.timer.clone(),
                encoder: io.encoder.clone(),
                clock: rig.clock(),
            },
        );
        handles.push(tasks::spawn(axis, flags.clone())?);
    }

    // Bridge wall-clock time into the simulated rig.
    let pump_rig = rig.clone();
    let tick = args.tick_ms.max(1);
    std::thread::Builder::new()
        .name("sim_pump".into())
        .spawn(move || {
            loop {
                std::thread::sleep(Duration::from_millis(tick));
                pump_rig.advance_ms(tick);
            }
        })?;

    let dispatcher = Arc::new(Dispatcher::new(handles, flags, logs));
    let port = args.port.unwrap_or(config.server.port);
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    server::serve(listener, dispatcher)?;
    Ok(())
}
