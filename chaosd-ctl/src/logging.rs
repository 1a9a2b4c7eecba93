use console::style;
use env_logger::{Builder, Env};
use log::Level;
use std::io::Write;

/// Crates whose records are shown with `--verbose`
const CHAOS_TARGETS: [&str; 4] = ["chaos_core", "chaos_namespace", "chaos_daemon", "chaosd_ctl"];

fn default_filter(verbose: bool) -> String {
    if verbose {
        CHAOS_TARGETS
            .iter()
            .map(|target| format!("{}=debug", target))
            .chain(std::iter::once("warn".to_string()))
            .collect::<Vec<_>>()
            .join(",")
    } else {
        "warn".to_string()
    }
}

/// Initialize logger; `RUST_LOG` wins over the verbose flag
pub fn init_logger(verbose: bool) {
    let env = Env::default().filter_or("RUST_LOG", default_filter(verbose));

    Builder::from_env(env)
        .format(|buf, record| {
            let level = match record.level() {
                Level::Error => format!("{}", style("ERROR").red().bold()),
                Level::Warn => format!("{}", style("WARN ").yellow().bold()),
                Level::Info => format!("{}", style("INFO ").green()),
                Level::Debug => format!("{}", style("DEBUG").cyan()),
                Level::Trace => format!("{}", style("TRACE").dim()),
            };
            let target = record.target().split("::").last().unwrap_or_default();
            writeln!(buf, "{} {} {}", level, style(target).dim(), record.args())
        })
        .init();
}
