//! chaos-daemon: node-local lifecycle core of chaosd
//!
//! Keeps helper processes and in-process effects consistent while many
//! fault requests act on the same node concurrently.
//!
//! # Modules
//!
//! - **supervisor**: start helpers (optionally inside a target's namespaces),
//!   watch them until exit, terminate them by durable identity
//! - **effects**: merge the contributions of concurrent requesters per target
//!   and inject or recover the resulting effect
//!
//! # Example
//!
//! ```ignore
//! use chaos_core::Context;
//! use chaos_daemon::{ProcessBuilder, ProcessSupervisor, SupervisorConfig};
//! use std::time::Duration;
//!
//! let config = SupervisorConfig::default().with_env_overrides();
//! let supervisor = ProcessSupervisor::new(config.clone())?;
//!
//! let spec = ProcessBuilder::new("/bin/sleep")
//!     .arg("60")
//!     .set_identifier("sleep-demo")
//!     .build(&config)?;
//! let identity = supervisor.start_process(spec)?;
//!
//! supervisor.kill_process(identity, &Context::with_timeout(Duration::from_secs(5)))?;
//! ```

pub mod effects;
pub mod supervisor;

pub use effects::{
    EffectConfig, EffectRegistry, EffectTarget, FaultConfig, FaultEffect, FaultHandler, Patchers,
    ProcessEffect, Withdrawal,
};
pub use supervisor::{
    ExecutionSpec, ProcFs, ProcessBuilder, ProcessHost, ProcessSupervisor, StdioBundle,
    StreamMode, SupervisorConfig,
};
