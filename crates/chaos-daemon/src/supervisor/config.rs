//! Supervisor configuration

use std::fs;
use std::path::{Path, PathBuf};

use chaos_core::{CREATE_TIME_TOLERANCE_MS, ChaosError, ProcRoot, Result, ResultExt};
use serde::Deserialize;

pub const DEFAULT_PAUSE_PATH: &str = "/usr/local/bin/pause";
pub const DEFAULT_NSEXEC_PATH: &str = "/usr/local/bin/nsexec";

pub const ENV_PAUSE_PATH: &str = "CHAOSD_PAUSE_PATH";
pub const ENV_NSEXEC_PATH: &str = "CHAOSD_NSEXEC_PATH";
pub const ENV_PROC_PREFIX: &str = "CHAOSD_PROC_PREFIX";

/// Process supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Helper that idles until signaled, then execs the payload
    pub pause_path: PathBuf,
    /// Helper that enters namespaces before exec'ing the payload
    pub nsexec_path: PathBuf,
    /// Mount point of procfs
    pub proc_prefix: PathBuf,
    /// Accepted creation-time drift when re-identifying a process (ms)
    pub create_time_tolerance_ms: i64,
    /// Deliver SIGTERM to helpers when the spawning thread dies
    pub parent_death_signal: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            pause_path: PathBuf::from(DEFAULT_PAUSE_PATH),
            nsexec_path: PathBuf::from(DEFAULT_NSEXEC_PATH),
            proc_prefix: PathBuf::from(chaos_core::procfs::DEFAULT_PROC_PREFIX),
            create_time_tolerance_ms: CREATE_TIME_TOLERANCE_MS,
            parent_death_signal: true,
        }
    }
}

impl SupervisorConfig {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(ChaosError::from)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: SupervisorConfig = serde_json::from_str(&content).map_err(|e| {
            ChaosError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHAOSD_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_PAUSE_PATH).filter(|v| !v.is_empty()) {
            self.pause_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_NSEXEC_PATH).filter(|v| !v.is_empty()) {
            self.nsexec_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_PROC_PREFIX).filter(|v| !v.is_empty()) {
            self.proc_prefix = PathBuf::from(path);
        }
        self
    }

    pub fn pause_path(mut self, path: impl AsRef<Path>) -> Self {
        self.pause_path = path.as_ref().to_path_buf();
        self
    }

    pub fn nsexec_path(mut self, path: impl AsRef<Path>) -> Self {
        self.nsexec_path = path.as_ref().to_path_buf();
        self
    }

    pub fn proc_prefix(mut self, path: impl AsRef<Path>) -> Self {
        self.proc_prefix = path.as_ref().to_path_buf();
        self
    }

    pub fn create_time_tolerance_ms(mut self, tolerance: i64) -> Self {
        self.create_time_tolerance_ms = tolerance;
        self
    }

    pub fn parent_death_signal(mut self, enabled: bool) -> Self {
        self.parent_death_signal = enabled;
        self
    }

    pub fn proc_root(&self) -> ProcRoot {
        ProcRoot::new(&self.proc_prefix)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("pause_path", &self.pause_path),
            ("nsexec_path", &self.nsexec_path),
            ("proc_prefix", &self.proc_prefix),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ChaosError::InvalidConfig(format!("{} cannot be empty", name)));
            }
        }

        if !(0..=CREATE_TIME_TOLERANCE_MS).contains(&self.create_time_tolerance_ms) {
            return Err(ChaosError::InvalidConfig(format!(
                "create_time_tolerance_ms must be within 0..={}, got {}",
                CREATE_TIME_TOLERANCE_MS, self.create_time_tolerance_ms
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_core::ErrorKind;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SupervisorConfig::default();
        assert_eq!(config.pause_path, PathBuf::from("/usr/local/bin/pause"));
        assert_eq!(config.nsexec_path, PathBuf::from("/usr/local/bin/nsexec"));
        assert_eq!(config.proc_prefix, PathBuf::from("/proc"));
        assert_eq!(config.create_time_tolerance_ms, 1000);
        assert!(config.parent_death_signal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tolerance_cannot_be_widened() {
        let err = SupervisorConfig::default()
            .create_time_tolerance_ms(5000)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        assert!(
            SupervisorConfig::default()
                .create_time_tolerance_ms(0)
                .validate()
                .is_ok()
        );
        assert!(
            SupervisorConfig::default()
                .create_time_tolerance_ms(-1)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn empty_paths_are_rejected() {
        let err = SupervisorConfig::default().nsexec_path("").validate().unwrap_err();
        assert!(err.to_string().contains("nsexec_path"));
    }

    #[test]
    fn load_partial_json() {
        let mut file = NamedTempFile::new().unwrap();
        use std::io::Write;
        write!(file, r#"{{"nsexec_path": "/opt/chaos/nsexec", "parent_death_signal": false}}"#)
            .unwrap();

        let config = SupervisorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.nsexec_path, PathBuf::from("/opt/chaos/nsexec"));
        assert_eq!(config.pause_path, PathBuf::from(DEFAULT_PAUSE_PATH));
        assert!(!config.parent_death_signal);
    }

    #[test]
    fn load_rejects_unknown_fields_and_wide_tolerance() {
        let mut file = NamedTempFile::new().unwrap();
        use std::io::Write;
        write!(file, r#"{{"pause": "/bin/pause"}}"#).unwrap();
        let err = SupervisorConfig::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"create_time_tolerance_ms": 2000}}"#).unwrap();
        assert!(SupervisorConfig::from_json_file(file.path()).is_err());
    }

    #[test]
    fn env_overrides_replace_paths() {
        let vars: HashMap<&str, &str> = [
            (ENV_NSEXEC_PATH, "/custom/nsexec"),
            (ENV_PROC_PREFIX, "/host/proc"),
            (ENV_PAUSE_PATH, ""),
        ]
        .into_iter()
        .collect();

        let config = SupervisorConfig::default()
            .with_overrides_from(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.nsexec_path, PathBuf::from("/custom/nsexec"));
        assert_eq!(config.proc_prefix, PathBuf::from("/host/proc"));
        assert_eq!(config.pause_path, PathBuf::from(DEFAULT_PAUSE_PATH));
        assert_eq!(config.proc_root().prefix(), Path::new("/host/proc"));
    }
}
