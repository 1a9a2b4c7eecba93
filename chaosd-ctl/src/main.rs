//! chaosd-ctl - run and terminate chaosd helpers from a shell

mod cli;
mod commands;
mod logging;
mod runner;

use clap::Parser;
use cli::{Cli, Commands};
use commands::check_requirements;
use console::style;
use runner::{ExecConfig, load_config, run_exec, run_kill};

use chaos_core::ProcessIdentity;
use chaos_daemon::ProcessSupervisor;

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", style("error:").red().bold(), e);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    logging::init_logger(cli.verbose);

    let config = load_config(cli.config.as_deref()).unwrap_or_else(|e| fail(e));

    let result = match cli.command {
        Commands::Check => {
            check_requirements(&config);
            return;
        }
        Commands::Exec {
            ns_pid,
            ns,
            local_mnt,
            pause,
            id,
            timeout,
            program,
            args,
        } => ProcessSupervisor::new(config)
            .map_err(Into::into)
            .and_then(|supervisor| {
                run_exec(
                    &supervisor,
                    ExecConfig {
                        program,
                        args,
                        ns_pid,
                        ns,
                        local_mnt,
                        pause,
                        id,
                        timeout,
                    },
                )
            }),
        Commands::Kill {
            pid,
            create_time,
            timeout,
        } => ProcessSupervisor::new(config)
            .map_err(Into::into)
            .and_then(|supervisor| {
                run_kill(&supervisor, ProcessIdentity::new(pid, create_time), timeout)
            }),
    };

    if let Err(e) = result {
        fail(e);
    }
}
