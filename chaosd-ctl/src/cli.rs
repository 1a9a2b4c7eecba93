use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chaos_namespace::NsType;

#[derive(Parser)]
#[command(name = "chaosd-ctl")]
#[command(version, about = "Drive the chaosd process supervisor from a shell", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Run a helper inside the network namespace of pid 4242, kill it after 30s
    chaosd-ctl exec --ns-pid 4242 --ns net --timeout 30 -- tc qdisc show

    # Run a helper under the pause helper with an exclusion identifier
    chaosd-ctl exec --pause --id toda-4242 -- toda --path /var/lib

    # Check what this node supports
    chaosd-ctl check
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Supervisor configuration file (JSON)
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a helper under the supervisor and wait for it
    Exec {
        /// Join the namespaces of this process
        #[arg(long, value_name = "PID")]
        ns_pid: Option<i32>,

        /// Namespaces to join (mnt, ipc, net, pid)
        #[arg(long, value_name = "NS", value_delimiter = ',', requires = "ns_pid")]
        ns: Vec<NsType>,

        /// Give the helper a private mount namespace
        #[arg(long)]
        local_mnt: bool,

        /// Wrap the helper with the pause helper
        #[arg(long)]
        pause: bool,

        /// Exclusion identifier; one helper per identifier runs at a time
        #[arg(long, value_name = "ID")]
        id: Option<String>,

        /// Kill the helper after this many seconds
        #[arg(short, long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Program to run
        program: String,

        /// Program arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Kill a process by identity
    Kill {
        #[arg(long)]
        pid: i32,

        /// Creation time in ms since the epoch
        #[arg(long, value_name = "MS")]
        create_time: i64,

        /// Give up waiting for the exit after this many seconds
        #[arg(short, long, value_name = "SECONDS", default_value_t = 10)]
        timeout: u64,
    },

    /// Check node capabilities
    Check,
}
