use console::style;
use log::{debug, info};
use std::path::Path;
use std::time::Duration;

use chaos_core::{Context, ErrorKind, ProcessIdentity};
use chaos_daemon::{ProcessBuilder, ProcessSupervisor, StreamMode, SupervisorConfig};
use chaos_namespace::NsType;

/// Grace period for a helper to exit after SIGTERM
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Configuration for a helper run
pub struct ExecConfig {
    pub program: String,
    pub args: Vec<String>,
    pub ns_pid: Option<i32>,
    pub ns: Vec<NsType>,
    pub local_mnt: bool,
    pub pause: bool,
    pub id: Option<String>,
    pub timeout: Option<u64>,
}

pub fn load_config(path: Option<&Path>) -> chaos_core::Result<SupervisorConfig> {
    let config = match path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            SupervisorConfig::from_json_file(path)?
        }
        None => SupervisorConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

pub fn run_exec(
    supervisor: &ProcessSupervisor,
    exec: ExecConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = ProcessBuilder::new(&exec.program)
        .args(&exec.args)
        .stdout(StreamMode::Inherit)
        .stderr(StreamMode::Inherit);

    if let Some(pid) = exec.ns_pid {
        let kinds = if exec.ns.is_empty() {
            NsType::all().to_vec()
        } else {
            exec.ns
        };
        for kind in kinds {
            debug!("Joining {} namespace of {}", kind, pid);
            builder = builder.set_ns(pid, kind);
        }
    }
    if exec.local_mnt {
        builder = builder.enable_local_mnt();
    }
    if exec.pause {
        builder = builder.enable_pause();
    }
    if let Some(id) = exec.id {
        builder = builder.set_identifier(id);
    }

    let spec = builder.build(supervisor.config())?;
    info!("Executing: {}", spec.command_line().join(" "));

    let identity = supervisor.start_process(spec)?;
    println!("{}", serde_json::to_string(&identity)?);

    let ctx = match exec.timeout {
        Some(secs) => Context::with_timeout(Duration::from_secs(secs)),
        None => Context::background(),
    };

    match supervisor.wait(&identity, &ctx) {
        Ok(()) => {
            eprintln!("{} {}", style("exited:").green().bold(), identity);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::DeadlineExceeded => {
            info!("Timeout reached, terminating {}", identity);
            supervisor.kill_process(identity, &Context::with_timeout(KILL_GRACE))?;
            eprintln!("{} {}", style("killed:").yellow().bold(), identity);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn run_kill(
    supervisor: &ProcessSupervisor,
    identity: ProcessIdentity,
    timeout: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Killing {}", identity);
    supervisor.kill_process(identity, &Context::with_timeout(Duration::from_secs(timeout)))?;
    println!("{} {}", style("done:").green().bold(), identity);
    Ok(())
}
