//! Runtime detection of what the node offers to chaosd
//!
//! Probes procfs, privileges and the helper binaries used to enter
//! namespaces, so the operator can see why a fault cannot be injected.

use std::path::Path;

use nix::unistd::{AccessFlags, access};

use crate::procfs::ProcRoot;

/// Detected system capabilities
#[derive(Debug, Clone)]
pub struct SystemCapabilities {
    /// Running as root (euid == 0)
    pub has_root: bool,
    /// procfs is mounted at the configured prefix
    pub has_procfs: bool,
    /// `/proc/<pid>/ns/*` entries are exposed
    pub has_ns_files: bool,
    /// The pause helper exists and is executable
    pub has_pause_helper: bool,
    /// The nsexec helper exists and is executable
    pub has_nsexec_helper: bool,
}

impl SystemCapabilities {
    /// Detect all capabilities on the current system
    pub fn detect(proc_root: &ProcRoot, pause_path: &Path, nsexec_path: &Path) -> Self {
        Self {
            has_root: detect_root(),
            has_procfs: detect_procfs(proc_root),
            has_ns_files: detect_ns_files(proc_root),
            has_pause_helper: is_executable(pause_path),
            has_nsexec_helper: is_executable(nsexec_path),
        }
    }

    /// Helpers can be supervised at all
    pub fn can_supervise(&self) -> bool {
        self.has_procfs
    }

    /// Helpers can be started inside a target's namespaces
    pub fn can_enter_namespaces(&self) -> bool {
        self.has_procfs && self.has_ns_files && self.has_nsexec_helper && self.has_root
    }

    /// Get a human-readable summary of capabilities
    pub fn summary(&self) -> String {
        let check = |available: bool| if available { "[ok]" } else { "[--]" };

        [
            format!("{} Root privileges", check(self.has_root)),
            format!("{} procfs mounted", check(self.has_procfs)),
            format!("{} Namespace files", check(self.has_ns_files)),
            format!("{} pause helper", check(self.has_pause_helper)),
            format!("{} nsexec helper", check(self.has_nsexec_helper)),
        ]
        .join("\n")
    }
}

fn detect_root() -> bool {
    nix::unistd::geteuid().is_root()
}

fn detect_procfs(proc_root: &ProcRoot) -> bool {
    proc_root.prefix().join("self/stat").exists()
}

fn detect_ns_files(proc_root: &ProcRoot) -> bool {
    proc_root.prefix().join("self/ns/mnt").exists()
}

fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}
