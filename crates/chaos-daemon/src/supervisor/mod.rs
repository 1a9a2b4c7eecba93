//! Process Supervisor: starting, watching and terminating helper processes

pub mod builder;
pub mod config;
pub mod host;
pub mod manager;
pub mod signal;
pub mod stdio;

pub use builder::{ExecutionSpec, ProcessBuilder, StreamMode};
pub use config::SupervisorConfig;
pub use host::{Delivery, HostProcess, ProcFs, ProcessHost};
pub use manager::ProcessSupervisor;
pub use signal::{ExclusionGuard, ExclusionTable, ExitSignal};
pub use stdio::StdioBundle;
