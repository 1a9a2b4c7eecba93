//! Durable process identity
//!
//! A numeric pid alone is not a safe handle: the kernel recycles it once the
//! process is reaped. Pairing it with the creation time identifies one
//! execution even after the number has been handed to somebody else.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChaosError, Result};
use crate::procfs::ProcRoot;

/// Largest accepted difference between a recorded and an observed creation time.
///
/// Two reads of the same process may disagree by up to a tick converted
/// through a floating boot time, so exact equality is not used.
pub const CREATE_TIME_TOLERANCE_MS: i64 = 1000;

/// (pid, creation time in ms since the epoch) of one process execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub pid: i32,
    pub create_time: i64,
}

impl ProcessIdentity {
    pub fn new(pid: i32, create_time: i64) -> Self {
        Self { pid, create_time }
    }

    /// Read the creation time of a live process and build its identity
    pub fn capture(proc_root: &ProcRoot, pid: i32) -> Result<Self> {
        let create_time = proc_root
            .create_time(pid)?
            .ok_or_else(|| ChaosError::ProcFs(format!("process {} vanished before capture", pid)))?;
        Ok(Self { pid, create_time })
    }

    /// Whether `observed` is the creation time of this very execution
    pub fn matches(&self, observed: i64, tolerance_ms: i64) -> bool {
        create_time_matches(self.create_time, observed, tolerance_ms)
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pid, self.create_time)
    }
}

/// Compare two creation times within `tolerance_ms` (inclusive)
pub fn create_time_matches(expected: i64, observed: i64, tolerance_ms: i64) -> bool {
    expected.abs_diff(observed) <= tolerance_ms.unsigned_abs()
}
