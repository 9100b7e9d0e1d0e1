//! Per-axis task wiring.
//!
//! [`spawn`] creates the two endless tasks of one axis: the command
//! task, blocking on the bounded command queue, and the supervisor
//! task, blocking on the supervisor signal. The returned [`AxisHandle`]
//! is the enqueue side used by the command adapter.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{info, warn};

use triax_common::consts::COMMAND_QUEUE_DEPTH;
use triax_common::types::AxisCommand;

use crate::axis::Axis;
use crate::flags::SystemFlags;
use crate::rt;

/// The axis tasks are gone; no further commands can be delivered.
#[derive(Debug, Error)]
#[error("axis command queue closed")]
pub struct QueueClosed;

/// Enqueue side and lifecycle of one axis' tasks.
pub struct AxisHandle {
    axis: Arc<Axis>,
    queue: SyncSender<AxisCommand>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

/// Spawn the command and supervisor tasks of `axis`.
pub fn spawn(axis: Arc<Axis>, flags: Arc<SystemFlags>) -> io::Result<AxisHandle> {
    let (queue, rx) = mpsc::sync_channel::<AxisCommand>(COMMAND_QUEUE_DEPTH);
    let shutdown = Arc::new(AtomicBool::new(false));

    let command_axis = axis.clone();
    let command = thread::Builder::new()
        .name(format!("{}_cmd", axis.name()))
        .spawn(move || {
            if let Err(e) = rt::set_current_thread_priority(rt::COMMAND_PRIORITY) {
                warn!("{}: command task: {e}", command_axis.name());
            }
            // Ends when the enqueue side is dropped.
            for msg in rx.iter() {
                command_axis.handle(msg);
            }
        })?;

    let supervisor_axis = axis.clone();
    let supervisor_shutdown = shutdown.clone();
    let supervisor = thread::Builder::new()
        .name(format!("{}_sup", axis.name()))
        .spawn(move || {
            if let Err(e) = rt::set_current_thread_priority(rt::SUPERVISOR_PRIORITY) {
                warn!("{}: supervisor task: {e}", supervisor_axis.name());
            }
            loop {
                supervisor_axis.supervisor_signal().take();
                if supervisor_shutdown.load(Ordering::Acquire) {
                    break;
                }
                supervisor_axis.supervise_once(&flags);
            }
        })?;

    info!("{}: command and supervisor tasks created", axis.name());
    Ok(AxisHandle {
        axis,
        queue,
        shutdown,
        threads: vec![command, supervisor],
    })
}

impl AxisHandle {
    pub fn axis(&self) -> &Arc<Axis> {
        &self.axis
    }

    /// Enqueue a command, blocking while the queue is full.
    pub fn send(&self, cmd: AxisCommand) -> Result<(), QueueClosed> {
        self.queue.send(cmd).map_err(|_| QueueClosed)
    }

    /// Stop both tasks and wait for them to exit.
    pub fn shutdown(self) {
        let Self {
            axis,
            queue,
            shutdown,
            threads,
        } = self;
        shutdown.store(true, Ordering::Release);
        drop(queue);
        axis.supervisor_signal().give();
        for handle in threads {
            if handle.join().is_err() {
                warn!("{}: task panicked during shutdown", axis.name());
            }
        }
    }
}
