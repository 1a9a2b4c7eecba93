//! Namespace join directives for helper processes

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chaos_core::{ChaosError, ProcRoot, Result, ResultExt};
use serde::{Deserialize, Serialize};

/// Namespace types a helper can be placed into.
///
/// uts and user namespaces are not supported by the nsexec helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NsType {
    #[serde(rename = "mnt")]
    Mount,
    Ipc,
    Net,
    Pid,
}

impl NsType {
    pub fn all() -> [NsType; 4] {
        [NsType::Mount, NsType::Ipc, NsType::Net, NsType::Pid]
    }

    /// Entry name under `/proc/<pid>/ns`
    pub fn as_str(&self) -> &'static str {
        match self {
            NsType::Mount => "mnt",
            NsType::Ipc => "ipc",
            NsType::Net => "net",
            NsType::Pid => "pid",
        }
    }

    /// Short option understood by nsexec
    pub fn nsexec_flag(&self) -> &'static str {
        match self {
            NsType::Mount => "-m",
            NsType::Ipc => "-i",
            NsType::Net => "-n",
            NsType::Pid => "-p",
        }
    }
}

impl fmt::Display for NsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NsType {
    type Err = ChaosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mnt" | "mount" => Ok(NsType::Mount),
            "ipc" => Ok(NsType::Ipc),
            "net" => Ok(NsType::Net),
            "pid" => Ok(NsType::Pid),
            other => Err(ChaosError::InvalidConfig(format!(
                "unsupported namespace type: {}",
                other
            ))),
        }
    }
}

/// Join the namespace of `typ` found at `path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsOption {
    pub typ: NsType,
    pub path: PathBuf,
}

impl NsOption {
    pub fn new(typ: NsType, path: impl AsRef<Path>) -> Self {
        Self {
            typ,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Directive for the namespace of a running process
    pub fn of_pid(proc_root: &ProcRoot, pid: i32, typ: NsType) -> Self {
        Self::new(typ, ns_path(proc_root, pid, typ))
    }

    /// The nsexec arguments for this directive
    pub fn to_args(&self) -> [String; 2] {
        [
            self.typ.nsexec_flag().to_string(),
            self.path.to_string_lossy().into_owned(),
        ]
    }

    /// Ensure the source path still refers to a namespace
    pub fn verify(&self) -> Result<u64> {
        namespace_inode(&self.path)
            .with_context(|| format!("{} namespace at {}", self.typ, self.path.display()))
    }
}

/// `<proc prefix>/<pid>/ns/<type>`
pub fn ns_path(proc_root: &ProcRoot, pid: i32, typ: NsType) -> PathBuf {
    proc_root.pid_path(pid, &format!("ns/{}", typ.as_str()))
}

/// Inode of a namespace file, which identifies the namespace
pub fn namespace_inode(path: &Path) -> Result<u64> {
    use std::os::unix::fs::MetadataExt;

    let stat = std::fs::metadata(path).map_err(|e| {
        ChaosError::InvalidConfig(format!(
            "Failed to get namespace info for {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(stat.ino())
}
