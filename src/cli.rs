use crate::config::Config;
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;
use std::path::PathBuf;

pub fn build_cli() -> Command {
    Command::new("netstatfs")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Mount process sockets as files and stream their captured traffic")
        .arg(
            Arg::new("mountpoint")
                .value_name("MOUNTPOINT")
                .help("Directory to mount the filesystem on")
                .value_parser(clap::value_parser!(PathBuf))
                .required(false),
        )
        .arg(
            Arg::new("mount")
                .short('m')
                .long("mount")
                .value_name("MOUNTPOINT")
                .help("Directory to mount the filesystem on")
                .value_parser(clap::value_parser!(PathBuf))
                .conflicts_with("mountpoint")
                .required(false),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: netstatfs/config.yml in the config directory)")
                .required(false),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Set the log level (if not provided, no logging will be enabled)")
                .value_parser(clap::value_parser!(LevelFilter))
                .required(false),
        )
        .arg(
            Arg::new("allow-other")
                .long("allow-other")
                .help("Allow other users to access the mount")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-promisc")
                .long("no-promisc")
                .help("Do not put capture interfaces into promiscuous mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("queue-capacity")
                .long("queue-capacity")
                .value_name("FRAMES")
                .help("Frames buffered per open socket file")
                .value_parser(clap::value_parser!(usize))
                .required(false),
        )
        .arg(
            Arg::new("proc-root")
                .long("proc-root")
                .value_name("DIR")
                .help("Process information filesystem to read from")
                .value_parser(clap::value_parser!(PathBuf))
                .required(false),
        )
}

/// Override file configuration with command line values
pub fn apply_matches(matches: &ArgMatches, config: &mut Config) {
    if let Some(mountpoint) = matches
        .get_one::<PathBuf>("mountpoint")
        .or_else(|| matches.get_one::<PathBuf>("mount"))
    {
        config.mountpoint = Some(mountpoint.clone());
    }

    if matches.get_flag("allow-other") {
        config.allow_other = true;
    }

    if matches.get_flag("no-promisc") {
        config.promiscuous = false;
    }

    if let Some(capacity) = matches.get_one::<usize>("queue-capacity") {
        config.queue_capacity = *capacity;
    }

    if let Some(proc_root) = matches.get_one::<PathBuf>("proc-root") {
        config.proc_root = proc_root.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let matches = build_cli().try_get_matches_from(args).unwrap();
        let mut config = Config::default();
        apply_matches(&matches, &mut config);
        config
    }

    #[test]
    fn test_positional_mountpoint() {
        let config = parse(&["netstatfs", "/mnt/net"]);
        assert_eq!(config.mountpoint, Some(PathBuf::from("/mnt/net")));
    }

    #[test]
    fn test_mount_flag() {
        let config = parse(&["netstatfs", "-m", "/mnt/net"]);
        assert_eq!(config.mountpoint, Some(PathBuf::from("/mnt/net")));
        assert!(
            build_cli()
                .try_get_matches_from(["netstatfs", "/a", "-m", "/b"])
                .is_err()
        );
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "netstatfs",
            "/mnt",
            "--allow-other",
            "--no-promisc",
            "--queue-capacity",
            "16",
            "--proc-root",
            "/host/proc",
        ]);
        assert!(config.allow_other);
        assert!(!config.promiscuous);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.proc_root, PathBuf::from("/host/proc"));
    }

    #[test]
    fn test_flags_absent_keep_config() {
        let config = parse(&["netstatfs"]);
        assert_eq!(config.mountpoint, None);
        assert!(config.promiscuous);
        assert_eq!(config.queue_capacity, 1000);
    }

    #[test]
    fn test_log_level() {
        let matches = build_cli()
            .try_get_matches_from(["netstatfs", "-l", "debug"])
            .unwrap();
        assert_eq!(
            matches.get_one::<LevelFilter>("log-level"),
            Some(&LevelFilter::Debug)
        );
        assert!(
            build_cli()
                .try_get_matches_from(["netstatfs", "-l", "chatty"])
                .is_err()
        );
    }
}
