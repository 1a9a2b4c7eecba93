//! Lifecycle of supervised helper processes

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ExitStatus};
use std::sync::Arc;
use std::thread;

use chaos_core::{ChaosError, Context, ProcessIdentity, Result};
use dashmap::DashMap;
use log::{debug, error, info, warn};

use super::builder::ExecutionSpec;
use super::config::SupervisorConfig;
use super::host::{Delivery, ProcFs, ProcessHost};
use super::signal::{ExclusionGuard, ExclusionTable, ExitSignal};
use super::stdio::StdioBundle;

#[derive(Debug)]
struct Record {
    exit: ExitSignal,
    stdio: Arc<StdioBundle>,
}

struct Inner<H> {
    config: SupervisorConfig,
    host: H,
    records: DashMap<ProcessIdentity, Arc<Record>>,
    exclusions: ExclusionTable,
}

/// Starts helpers, watches them until exit and terminates them on request.
///
/// Processes are addressed by [`ProcessIdentity`], so a handle kept across a
/// pid recycle never reaches the new owner of the number. Cloning shares the
/// same registry.
pub struct ProcessSupervisor<H: ProcessHost = ProcFs> {
    inner: Arc<Inner<H>>,
}

impl<H: ProcessHost> Clone for ProcessSupervisor<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ProcessSupervisor {
    /// Supervisor on the real host, reading the configured procfs
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        let host = ProcFs::new(config.proc_root());
        Self::with_host(config, host)
    }
}

impl<H: ProcessHost> ProcessSupervisor<H> {
    pub fn with_host(config: SupervisorConfig, host: H) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                host,
                records: DashMap::new(),
                exclusions: ExclusionTable::new(),
            }),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    /// Start a helper and return its identity without waiting for it.
    ///
    /// When the spec carries an identifier this blocks until no other
    /// helper with that identifier is alive. A namespace to join that no
    /// longer exists fails with `StartFailed` before anything is spawned.
    pub fn start_process(&self, spec: ExecutionSpec) -> Result<ProcessIdentity> {
        let ExecutionSpec {
            mut command,
            payload,
            identifier,
            ns_options,
        } = spec;

        for option in &ns_options {
            option
                .verify()
                .map_err(|e| ChaosError::StartFailed {
                    program: payload.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, e),
                })?;
        }

        let guard = identifier.as_deref().map(|id| {
            debug!("Acquiring exclusion for identifier {}", id);
            self.inner.exclusions.acquire(id)
        });

        let mut child = command.spawn().map_err(|source| ChaosError::StartFailed {
            program: payload.clone(),
            source,
        })?;
        let pid = child.id() as i32;

        let identity = match self.capture(pid) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Killing {} (pid {}): creation time unavailable", payload, pid);
                discard(&mut child);
                return Err(e.context(format!("failed to identify {} (pid {})", payload, pid)));
            }
        };

        let record = Arc::new(Record {
            exit: ExitSignal::new(),
            stdio: Arc::new(StdioBundle::from_child(&mut child)),
        });
        self.inner.records.insert(identity, Arc::clone(&record));
        info!("Started {} as process {}", payload, identity);

        let inner = Arc::clone(&self.inner);
        thread::spawn(move || inner.watch(identity, child, record, guard));

        Ok(identity)
    }

    /// Terminate a supervised process and wait until it has exited.
    ///
    /// A process that is gone, was never ours, or whose pid now belongs to
    /// another execution counts as success and receives no signal.
    pub fn kill_process(&self, identity: ProcessIdentity, ctx: &Context) -> Result<()> {
        let process = match self.inner.host.inspect(identity.pid) {
            Ok(Some(process)) => process,
            Ok(None) => {
                info!("Process {} already exited", identity);
                return Ok(());
            }
            Err(e) => {
                warn!("Cannot inspect process {}, treating as exited: {}", identity, e);
                return Ok(());
            }
        };

        if !identity.matches(process.create_time, self.inner.config.create_time_tolerance_ms) {
            warn!(
                "Pid {} was reused (created at {}, expected {}), not signaling",
                identity.pid, process.create_time, identity.create_time
            );
            return Ok(());
        }

        let own_pid = self.inner.host.own_pid();
        if process.ppid != own_pid {
            warn!(
                "Process {} has parent {} instead of {}, not signaling",
                identity, process.ppid, own_pid
            );
            return Ok(());
        }

        let record = self.record(&identity);

        match self.inner.host.terminate(identity.pid)? {
            Delivery::AlreadyExited => {
                info!("Process {} exited before SIGTERM", identity);
                Ok(())
            }
            Delivery::Delivered => {
                info!("Sent SIGTERM to process {}", identity);
                match record {
                    Some(record) => record.exit.wait(ctx),
                    None => Ok(()),
                }
            }
        }
    }

    /// Piped streams of a live process
    pub fn stdio(&self, identity: &ProcessIdentity) -> Option<Arc<StdioBundle>> {
        self.record(identity)
            .filter(|record| !record.exit.is_fired())
            .map(|record| Arc::clone(&record.stdio))
    }

    pub fn is_alive(&self, identity: &ProcessIdentity) -> bool {
        self.record(identity)
            .is_some_and(|record| !record.exit.is_fired())
    }

    /// Wait for a process to exit on its own
    pub fn wait(&self, identity: &ProcessIdentity, ctx: &Context) -> Result<()> {
        match self.record(identity) {
            Some(record) => record.exit.wait(ctx),
            None => Ok(()),
        }
    }

    /// Identities of every process still supervised
    pub fn running(&self) -> Vec<ProcessIdentity> {
        self.inner.records.iter().map(|entry| *entry.key()).collect()
    }

    fn capture(&self, pid: i32) -> Result<ProcessIdentity> {
        let process = self.inner.host.inspect(pid)?.ok_or_else(|| {
            ChaosError::ProcFs(format!("process {} vanished before capture", pid))
        })?;
        Ok(ProcessIdentity::new(pid, process.create_time))
    }

    fn record(&self, identity: &ProcessIdentity) -> Option<Arc<Record>> {
        if let Some(record) = self.inner.records.get(identity) {
            return Some(Arc::clone(record.value()));
        }

        let tolerance = self.inner.config.create_time_tolerance_ms;
        self.inner
            .records
            .iter()
            .find(|entry| {
                entry.key().pid == identity.pid
                    && entry.key().matches(identity.create_time, tolerance)
            })
            .map(|entry| Arc::clone(entry.value()))
    }
}

impl<H: ProcessHost> Inner<H> {
    /// Body of the waiter thread: reap, clean up, then notify
    fn watch(
        &self,
        identity: ProcessIdentity,
        mut child: Child,
        record: Arc<Record>,
        guard: Option<ExclusionGuard>,
    ) {
        match child.wait() {
            Ok(status) => log_exit(&identity, &status),
            Err(e) => error!("Failed to wait for process {}: {}", identity, e),
        }

        self.records.remove(&identity);
        record.stdio.close_all();
        drop(guard);
        record.exit.fire();
    }
}

fn log_exit(identity: &ProcessIdentity, status: &ExitStatus) {
    match status.signal() {
        Some(libc::SIGTERM) => info!("Process {} terminated gracefully", identity),
        Some(signal) => warn!("Process {} killed by signal {}", identity, signal),
        None if status.success() => info!("Process {} exited", identity),
        None => warn!("Process {} exited abnormally: {}", identity, status),
    }
}

fn discard(child: &mut Child) {
    if let Err(e) = child.kill() {
        error!("Failed to kill process {}: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        error!("Failed to reap process {}: {}", child.id(), e);
    }
}
