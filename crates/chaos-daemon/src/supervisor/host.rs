//! Access to the processes of the host
//!
//! The supervisor only ever needs three things from the kernel: the
//! creation time and parent of a pid, its own pid, and a way to deliver
//! SIGTERM. They sit behind [`ProcessHost`] so kill decisions can be
//! exercised against pid reuse and foreign parents without racing the
//! real kernel.

use chaos_core::{ChaosError, ProcRoot, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// What the host reports about one pid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProcess {
    /// Creation time in ms since the epoch
    pub create_time: i64,
    pub ppid: i32,
}

/// Outcome of a termination request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The process was already gone
    AlreadyExited,
}

pub trait ProcessHost: Send + Sync + 'static {
    /// Inspect `pid`; `Ok(None)` when no such process exists
    fn inspect(&self, pid: i32) -> Result<Option<HostProcess>>;

    /// Pid of the supervising process
    fn own_pid(&self) -> i32;

    /// Ask `pid` to terminate gracefully
    fn terminate(&self, pid: i32) -> Result<Delivery>;
}

/// The real host, read through procfs and signaled with kill(2)
#[derive(Debug, Clone, Default)]
pub struct ProcFs {
    root: ProcRoot,
}

impl ProcFs {
    pub fn new(root: ProcRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ProcRoot {
        &self.root
    }
}

impl ProcessHost for ProcFs {
    fn inspect(&self, pid: i32) -> Result<Option<HostProcess>> {
        let Some(stat) = self.root.stat(pid)? else {
            return Ok(None);
        };
        let create_time = self.root.start_ticks_to_millis(stat.start_ticks)?;
        Ok(Some(HostProcess {
            create_time,
            ppid: stat.ppid,
        }))
    }

    fn own_pid(&self) -> i32 {
        std::process::id() as i32
    }

    fn terminate(&self, pid: i32) -> Result<Delivery> {
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => Ok(Delivery::Delivered),
            Err(Errno::ESRCH) => Ok(Delivery::AlreadyExited),
            Err(errno) => Err(ChaosError::SignalFailed { pid, errno }),
        }
    }
}
