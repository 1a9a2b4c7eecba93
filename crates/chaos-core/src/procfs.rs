//! Process inspection via /proc
//!
//! Reads the parts of `/proc/<pid>/stat` and `/proc/stat` needed to identify a
//! process execution durably: its parent, its state and its creation time.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ChaosError, Result};

/// Default mount point of procfs
pub const DEFAULT_PROC_PREFIX: &str = "/proc";

/// Process state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process is running
    Running,
    /// Process is sleeping
    Sleeping,
    /// Process is stopped or traced
    Stopped,
    /// Process is zombie
    Zombie,
    /// Process state is unknown
    Unknown,
}

impl ProcessState {
    /// Parse state from /proc stat state character
    pub fn from_char(c: char) -> Self {
        match c {
            'R' => ProcessState::Running,
            'S' | 'D' | 'I' => ProcessState::Sleeping,
            'T' | 't' => ProcessState::Stopped,
            'Z' => ProcessState::Zombie,
            _ => ProcessState::Unknown,
        }
    }
}

/// The fields of `/proc/<pid>/stat` chaosd cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: i32,
    pub comm: String,
    pub state: ProcessState,
    pub ppid: i32,
    /// Start time in clock ticks after boot (field 22)
    pub start_ticks: u64,
}

impl ProcStat {
    /// Parse the content of a `/proc/<pid>/stat` file.
    ///
    /// `comm` may itself contain spaces and parentheses, so the fixed fields
    /// are located after the last `)`.
    pub fn parse(content: &str) -> Result<Self> {
        let open = content
            .find('(')
            .ok_or_else(|| ChaosError::ProcFs("stat: missing '('".to_string()))?;
        let close = content
            .rfind(')')
            .ok_or_else(|| ChaosError::ProcFs("stat: missing ')'".to_string()))?;
        if close < open {
            return Err(ChaosError::ProcFs("stat: malformed comm".to_string()));
        }

        let pid: i32 = content[..open]
            .trim()
            .parse()
            .map_err(|_| ChaosError::ProcFs("stat: invalid pid".to_string()))?;
        let comm = content[open + 1..close].to_string();

        // fields[0] is field 3 of proc(5)
        let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
        if fields.len() < 20 {
            return Err(ChaosError::ProcFs(format!(
                "stat: expected at least 22 fields, got {}",
                fields.len() + 2
            )));
        }

        let state = ProcessState::from_char(fields[0].chars().next().unwrap_or('?'));
        let ppid: i32 = fields[1]
            .parse()
            .map_err(|_| ChaosError::ProcFs("stat: invalid ppid".to_string()))?;
        let start_ticks: u64 = fields[19]
            .parse()
            .map_err(|_| ChaosError::ProcFs("stat: invalid starttime".to_string()))?;

        Ok(ProcStat {
            pid,
            comm,
            state,
            ppid,
            start_ticks,
        })
    }
}

/// Number of clock ticks per second used by /proc time fields
pub fn clock_ticks() -> u64 {
    // SAFETY: sysconf only reads a system constant and touches no memory of ours
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 { ticks as u64 } else { 100 }
}

/// A procfs mount, `/proc` unless configured otherwise
#[derive(Debug, Clone)]
pub struct ProcRoot {
    prefix: PathBuf,
}

impl Default for ProcRoot {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_PREFIX)
    }
}

impl ProcRoot {
    pub fn new(prefix: impl AsRef<Path>) -> Self {
        Self {
            prefix: prefix.as_ref().to_path_buf(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Path of a per-process entry, e.g. `pid_path(42, "ns/mnt")`
    pub fn pid_path(&self, pid: i32, entry: &str) -> PathBuf {
        self.prefix.join(pid.to_string()).join(entry)
    }

    /// Read `/proc/<pid>/stat`; `None` when no such process exists
    pub fn stat(&self, pid: i32) -> Result<Option<ProcStat>> {
        let path = self.pid_path(pid, "stat");
        match fs::read_to_string(&path) {
            Ok(content) => ProcStat::parse(&content).map(Some),
            Err(e) if is_gone(&e) => Ok(None),
            Err(e) => Err(ChaosError::ProcFs(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// System boot time in seconds since the epoch (`btime` in `/proc/stat`)
    pub fn boot_time(&self) -> Result<i64> {
        let path = self.prefix.join("stat");
        let content = fs::read_to_string(&path).map_err(|e| {
            ChaosError::ProcFs(format!("failed to read {}: {}", path.display(), e))
        })?;

        content
            .lines()
            .find_map(|line| line.strip_prefix("btime "))
            .and_then(|value| value.trim().parse().ok())
            .ok_or_else(|| ChaosError::ProcFs("btime not found in /proc/stat".to_string()))
    }

    /// Creation time of `pid` in milliseconds since the epoch
    pub fn create_time(&self, pid: i32) -> Result<Option<i64>> {
        let Some(stat) = self.stat(pid)? else {
            return Ok(None);
        };
        Ok(Some(self.start_ticks_to_millis(stat.start_ticks)?))
    }

    /// Convert a start time in ticks after boot to milliseconds since the epoch
    pub fn start_ticks_to_millis(&self, start_ticks: u64) -> Result<i64> {
        let boot = self.boot_time()?;
        let ticks = clock_ticks();
        let since_boot_ms = (start_ticks * 1000 / ticks) as i64;
        Ok(boot * 1000 + since_boot_ms)
    }
}

fn is_gone(e: &io::Error) -> bool {
    // ESRCH shows up when the process exits while the file is being read
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ESRCH)
}
