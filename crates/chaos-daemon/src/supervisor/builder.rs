//! Building the command line of a supervised helper
//!
//! Helpers are wrapped the way the node tooling expects:
//! - with `pause`, the payload runs as `pause <program> <args>...`;
//! - with namespace directives, the whole thing runs under
//!   `nsexec [-l] -<ns> <path>... -- <program> <args>...`.

use std::ffi::OsString;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chaos_core::{ChaosError, Result};
use chaos_namespace::{NsOption, NsType};
use log::debug;

use super::config::SupervisorConfig;

/// How one standard stream of the helper is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Connected to /dev/null
    #[default]
    Null,
    /// Shared with the daemon
    Inherit,
    /// A pipe kept in the supervisor's stdio registry
    Piped,
}

impl StreamMode {
    fn to_stdio(self) -> Stdio {
        match self {
            StreamMode::Null => Stdio::null(),
            StreamMode::Inherit => Stdio::inherit(),
            StreamMode::Piped => Stdio::piped(),
        }
    }
}

#[derive(Debug, Clone)]
enum NsSource {
    Process(i32),
    Path(PathBuf),
}

/// Incrementally describes a helper process
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    clear_env: bool,
    namespaces: Vec<(NsType, NsSource)>,
    pause: bool,
    local_mnt: bool,
    identifier: Option<String>,
    stdin: StreamMode,
    stdout: StreamMode,
    stderr: StreamMode,
}

impl ProcessBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            clear_env: false,
            namespaces: Vec::new(),
            pause: false,
            local_mnt: false,
            identifier: None,
            stdin: StreamMode::Null,
            stdout: StreamMode::Null,
            stderr: StreamMode::Null,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable of the process
    pub fn set_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Start from an empty environment instead of the daemon's
    pub fn clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Join the `typ` namespace of process `pid`
    pub fn set_ns(mut self, pid: i32, typ: NsType) -> Self {
        self.namespaces.push((typ, NsSource::Process(pid)));
        self
    }

    /// Join namespaces given by explicit paths
    pub fn set_ns_opt(mut self, options: impl IntoIterator<Item = NsOption>) -> Self {
        self.namespaces.extend(
            options
                .into_iter()
                .map(|opt| (opt.typ, NsSource::Path(opt.path))),
        );
        self
    }

    /// Set the identifier of the process.
    ///
    /// At most one process with a given identifier runs at a time; starting
    /// another one blocks until the running one has exited.
    pub fn set_identifier(mut self, id: impl Into<String>) -> Self {
        self.identifier = Some(id.into());
        self
    }

    /// Run the payload under the pause helper
    pub fn enable_pause(mut self) -> Self {
        self.pause = true;
        self
    }

    /// Give the helper its own mount namespace on top of the joined one
    pub fn enable_local_mnt(mut self) -> Self {
        self.local_mnt = true;
        self
    }

    pub fn stdin(mut self, mode: StreamMode) -> Self {
        self.stdin = mode;
        self
    }

    pub fn stdout(mut self, mode: StreamMode) -> Self {
        self.stdout = mode;
        self
    }

    pub fn stderr(mut self, mode: StreamMode) -> Self {
        self.stderr = mode;
        self
    }

    /// Resolve helper paths and namespace directives into an [`ExecutionSpec`]
    pub fn build(self, config: &SupervisorConfig) -> Result<ExecutionSpec> {
        if self.program.is_empty() {
            return Err(ChaosError::InvalidConfig(
                "program cannot be empty".to_string(),
            ));
        }
        if let Some(id) = &self.identifier
            && id.is_empty()
        {
            return Err(ChaosError::InvalidConfig(
                "identifier cannot be empty".to_string(),
            ));
        }

        let proc_root = config.proc_root();
        let ns_options: Vec<NsOption> = self
            .namespaces
            .into_iter()
            .map(|(typ, source)| match source {
                NsSource::Process(pid) => NsOption::of_pid(&proc_root, pid, typ),
                NsSource::Path(path) => NsOption::new(typ, path),
            })
            .collect();

        let (program, args) = wrap_command(
            OsString::from(&self.program),
            self.args.into_iter().map(OsString::from).collect(),
            self.pause.then_some(config.pause_path.as_path()),
            &ns_options,
            self.local_mnt,
            &config.nsexec_path,
        );

        debug!(
            "build command: {} {}",
            program.to_string_lossy(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut command = Command::new(&program);
        command.args(&args);
        if self.clear_env {
            command.env_clear();
        }
        command.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        command
            .stdin(self.stdin.to_stdio())
            .stdout(self.stdout.to_stdio())
            .stderr(self.stderr.to_stdio());

        if config.parent_death_signal {
            // SAFETY: prctl is async-signal-safe and touches no shared state
            unsafe {
                command.pre_exec(|| {
                    if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) != 0 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        Ok(ExecutionSpec {
            command,
            payload: self.program,
            identifier: self.identifier,
            ns_options,
        })
    }
}

fn wrap_command(
    mut program: OsString,
    mut args: Vec<OsString>,
    pause_path: Option<&Path>,
    ns_options: &[NsOption],
    local_mnt: bool,
    nsexec_path: &Path,
) -> (OsString, Vec<OsString>) {
    if let Some(pause) = pause_path {
        args.insert(0, program);
        program = pause.as_os_str().to_owned();
    }

    if !ns_options.is_empty() {
        let mut wrapped = Vec::with_capacity(args.len() + ns_options.len() * 2 + 3);
        if local_mnt {
            wrapped.push(OsString::from("-l"));
        }
        for option in ns_options {
            wrapped.extend(option.to_args().map(OsString::from));
        }
        wrapped.push(OsString::from("--"));
        wrapped.push(program);
        wrapped.extend(args);

        program = nsexec_path.as_os_str().to_owned();
        args = wrapped;
    }

    (program, args)
}

/// A fully described helper, consumed exactly once by the supervisor
#[derive(Debug)]
pub struct ExecutionSpec {
    pub(crate) command: Command,
    pub(crate) payload: String,
    pub(crate) identifier: Option<String>,
    pub(crate) ns_options: Vec<NsOption>,
}

impl ExecutionSpec {
    /// The command that will be spawned, helpers included
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn ns_options(&self) -> &[NsOption] {
        &self.ns_options
    }

    /// Program and arguments as strings, for logs and assertions
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.command.get_program())
            .chain(self.command.get_args())
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SupervisorConfig {
        SupervisorConfig::default()
            .pause_path("/opt/pause")
            .nsexec_path("/opt/nsexec")
            .proc_prefix("/proc")
    }

    #[test]
    fn plain_command_is_untouched() {
        let spec = ProcessBuilder::new("/bin/echo")
            .arg("hello")
            .arg("world")
            .build(&config())
            .unwrap();
        assert_eq!(spec.command_line(), vec!["/bin/echo", "hello", "world"]);
        assert!(spec.identifier().is_none());
        assert!(spec.ns_options().is_empty());
    }

    #[test]
    fn pause_wraps_payload() {
        let spec = ProcessBuilder::new("toda")
            .args(["--path", "/var/lib"])
            .enable_pause()
            .build(&config())
            .unwrap();
        assert_eq!(
            spec.command_line(),
            vec!["/opt/pause", "toda", "--path", "/var/lib"]
        );
    }

    #[test]
    fn namespaces_wrap_with_nsexec() {
        let spec = ProcessBuilder::new("tc")
            .args(["qdisc", "show"])
            .set_ns(42, NsType::Net)
            .set_ns(42, NsType::Pid)
            .build(&config())
            .unwrap();
        assert_eq!(
            spec.command_line(),
            vec![
                "/opt/nsexec",
                "-n",
                "/proc/42/ns/net",
                "-p",
                "/proc/42/ns/pid",
                "--",
                "tc",
                "qdisc",
                "show"
            ]
        );
        assert_eq!(spec.ns_options().len(), 2);
    }

    #[test]
    fn pause_namespaces_and_local_mount_compose() {
        let spec = ProcessBuilder::new("toda")
            .set_ns_opt([NsOption::new(NsType::Mount, "/run/ns/mnt")])
            .enable_pause()
            .enable_local_mnt()
            .set_identifier("toda-abc")
            .build(&config())
            .unwrap();
        assert_eq!(
            spec.command_line(),
            vec!["/opt/nsexec", "-l", "-m", "/run/ns/mnt", "--", "/opt/pause", "toda"]
        );
        assert_eq!(spec.identifier(), Some("toda-abc"));
    }

    #[test]
    fn local_mount_without_namespaces_is_ignored() {
        let spec = ProcessBuilder::new("/bin/true")
            .enable_local_mnt()
            .build(&config())
            .unwrap();
        assert_eq!(spec.command_line(), vec!["/bin/true"]);
    }

    #[test]
    fn env_overrides_are_recorded() {
        let spec = ProcessBuilder::new("/bin/env")
            .set_env("A", "1")
            .set_env("B", "2")
            .clear_env()
            .build(&config())
            .unwrap();
        let envs: Vec<_> = spec
            .command()
            .get_envs()
            .map(|(k, v)| (k.to_owned(), v.map(|v| v.to_owned())))
            .collect();
        assert!(envs.contains(&("A".into(), Some("1".into()))));
        assert!(envs.contains(&("B".into(), Some("2".into()))));
    }

    #[test]
    fn empty_program_or_identifier_is_rejected() {
        assert!(ProcessBuilder::new("").build(&config()).is_err());
        assert!(
            ProcessBuilder::new("/bin/true")
                .set_identifier("")
                .build(&config())
                .is_err()
        );
    }
}
