//! Real-time scheduling setup.
//!
//! With the `rt` cargo feature the axis tasks get `SCHED_FIFO`
//! priorities (command above supervisor, both below interrupt context)
//! and the process locks its pages. Without the feature every call is a
//! no-op, which is what simulation and tests run with.

use thiserror::Error;

/// RT setup error.
#[derive(Debug, Error)]
pub enum RtError {
    #[error("RT setup failed: {0}")]
    Setup(String),
}

/// SCHED_FIFO priority of the per-axis command task.
pub const COMMAND_PRIORITY: i32 = 80;

/// SCHED_FIFO priority of the per-axis supervisor task.
pub const SUPERVISOR_PRIORITY: i32 = 70;

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
pub fn lock_memory() -> Result<(), RtError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RtError::Setup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
pub fn lock_memory() -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Set SCHED_FIFO with the given priority on the calling thread.
#[cfg(feature = "rt")]
pub fn set_current_thread_priority(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret =
        unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(RtError::Setup(format!(
            "pthread_setschedparam(SCHED_FIFO, {priority}) failed: {}",
            std::io::Error::from_raw_os_error(ret)
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
pub fn set_current_thread_priority(_priority: i32) -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}
