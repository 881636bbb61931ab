use anyhow::{Result, anyhow};
use log::{LevelFilter, error, info, warn};
use netstatfs::cli::{apply_matches, build_cli};
use netstatfs::config::Config;
use netstatfs::fs::{NetstatTree, mount};
use netstatfs::network::capture::PcapCapturer;
use netstatfs::network::interfaces::PcapInterfaceProvider;
use netstatfs::network::privileges::check_packet_capture_privileges;
use netstatfs::network::procfs::LinuxProcfs;
use simplelog::{Config as LogConfig, WriteLogger};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let mut config = Config::load(matches.get_one::<String>("config").map(String::as_str))?;
    apply_matches(&matches, &mut config);

    // Set up logging only if log-level was provided
    if let Some(log_level) = matches.get_one::<LevelFilter>("log-level") {
        setup_logging(*log_level)?;
    }

    info!("Starting netstatfs");
    if let Some(path) = &config.config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let mountpoint = config
        .mountpoint
        .clone()
        .ok_or_else(|| anyhow!("No mountpoint given"))?;

    let procfs = Arc::new(LinuxProcfs::with_root(&config.proc_root));

    match check_packet_capture_privileges(procfs.as_ref()) {
        Ok(status) if !status.has_privileges => {
            let msg = status.error_message();
            warn!("{}", msg);
            eprintln!("{}", msg);
        }
        Ok(_) => {}
        Err(e) => warn!("Could not determine capture privileges: {}", e),
    }

    let tree = NetstatTree::from_procfs(
        procfs,
        Arc::new(PcapInterfaceProvider),
        Arc::new(PcapCapturer::new(config.capture_config())),
        config.session_config(),
    );

    if let Err(e) = mount(tree, &mountpoint, &config.mount_config()) {
        error!("Mount on {} failed: {}", mountpoint.display(), e);
        return Err(anyhow!("Failed to mount {}: {}", mountpoint.display(), e));
    }

    info!("netstatfs unmounted, shutting down");
    Ok(())
}

fn setup_logging(level: LevelFilter) -> Result<()> {
    // Create logs directory if it doesn't exist
    let log_dir = Path::new("logs");
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    // Create timestamped log file name
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let log_file_path = log_dir.join(format!("netstatfs_{}.log", timestamp));

    WriteLogger::init(level, LogConfig::default(), File::create(log_file_path)?)?;

    Ok(())
}
