use chaos_core::capabilities::SystemCapabilities;
use chaos_daemon::SupervisorConfig;
use log::info;

pub fn check_requirements(config: &SupervisorConfig) {
    info!("Checking node capabilities");
    println!("Checking node capabilities...\n");

    let caps = SystemCapabilities::detect(
        &config.proc_root(),
        &config.pause_path,
        &config.nsexec_path,
    );
    println!("{}", caps.summary());

    println!("\nSupervisor:");
    println!("  proc prefix: {}", config.proc_prefix.display());
    println!("  pause:       {}", config.pause_path.display());
    println!("  nsexec:      {}", config.nsexec_path.display());
    println!(
        "  can supervise: {}, can enter namespaces: {}",
        caps.can_supervise(),
        caps.can_enter_namespaces()
    );
}
