use crate::fs::MountConfig;
use crate::network::capture::CaptureConfig;
use crate::network::session::SessionConfig;
use anyhow::{Result, anyhow};
use log::warn;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the filesystem is mounted on
    pub mountpoint: Option<PathBuf>,
    /// Root of the process information filesystem
    pub proc_root: PathBuf,
    /// Bytes captured per frame
    pub snaplen: i32,
    /// Put capture interfaces into promiscuous mode
    pub promiscuous: bool,
    /// Capture read timeout in milliseconds
    pub read_timeout_ms: i32,
    /// Kernel capture buffer per open file, in bytes
    pub buffer_size: i32,
    /// Frames buffered per open file
    pub queue_capacity: usize,
    /// Pause after a transient capture error, in milliseconds
    pub retry_delay_ms: u64,
    /// Let other users access the mount
    pub allow_other: bool,
    /// Unmount automatically when the process exits
    pub auto_unmount: bool,
    /// Configuration file that was loaded, if any
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let capture = CaptureConfig::default();
        let session = SessionConfig::default();
        Self {
            mountpoint: None,
            proc_root: PathBuf::from("/proc"),
            snaplen: capture.snaplen,
            promiscuous: capture.promiscuous,
            read_timeout_ms: capture.timeout_ms,
            buffer_size: capture.buffer_size,
            queue_capacity: session.queue_capacity,
            retry_delay_ms: session.retry_delay.as_millis() as u64,
            allow_other: false,
            auto_unmount: true,
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = if let Some(path) = path {
            PathBuf::from(path)
        } else {
            Self::find_config_file()?
        };

        let mut config = Config::default();

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            config.apply(&content);
            config.config_path = Some(config_path);
        } else if path.is_some() {
            return Err(anyhow!(
                "Configuration file {} does not exist",
                config_path.display()
            ));
        }

        Ok(config)
    }

    /// Apply `key: value` lines on top of the current values
    pub fn apply(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            let applied = match key {
                "mountpoint" => {
                    self.mountpoint = Some(PathBuf::from(value));
                    true
                }
                "proc_root" => {
                    self.proc_root = PathBuf::from(value);
                    true
                }
                "snaplen" => parse_into(value, &mut self.snaplen),
                "promiscuous" => parse_into(value, &mut self.promiscuous),
                "read_timeout_ms" => parse_into(value, &mut self.read_timeout_ms),
                "buffer_size" => parse_into(value, &mut self.buffer_size),
                "queue_capacity" => parse_into(value, &mut self.queue_capacity),
                "retry_delay_ms" => parse_into(value, &mut self.retry_delay_ms),
                "allow_other" => parse_into(value, &mut self.allow_other),
                "auto_unmount" => parse_into(value, &mut self.auto_unmount),
                _ => {
                    // Ignore unknown keys
                    true
                }
            };

            if !applied {
                warn!("Ignoring invalid value '{}' for {}", value, key);
            }
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            snaplen: self.snaplen,
            promiscuous: self.promiscuous,
            buffer_size: self.buffer_size,
            timeout_ms: self.read_timeout_ms,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            queue_capacity: self.queue_capacity,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ..SessionConfig::default()
        }
    }

    pub fn mount_config(&self) -> MountConfig {
        MountConfig {
            allow_other: self.allow_other,
            auto_unmount: self.auto_unmount,
        }
    }

    /// Find configuration file
    fn find_config_file() -> Result<PathBuf> {
        // Try XDG config directory first
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let xdg_path = PathBuf::from(xdg_config).join("netstatfs/config.yml");
            if xdg_path.exists() {
                return Ok(xdg_path);
            }
        }

        // Try ~/.config/netstatfs
        let home = Self::get_home_dir()?;
        let home_config = home.join(".config/netstatfs/config.yml");
        if home_config.exists() {
            return Ok(home_config);
        }

        // Try current directory
        let current_config = PathBuf::from("config.yml");
        if current_config.exists() {
            return Ok(current_config);
        }

        // Default to home config path
        Ok(home_config)
    }

    fn get_home_dir() -> Result<PathBuf> {
        std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| anyhow!("Could not determine home directory"))
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, target: &mut T) -> bool {
    match value.parse() {
        Ok(parsed) => {
            *target = parsed;
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.snaplen, 1522);
        assert!(config.promiscuous);
        assert_eq!(config.read_timeout_ms, 150);
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.retry_delay_ms, 5);
        assert!(!config.allow_other);
        assert!(config.auto_unmount);
    }

    #[test]
    fn test_apply() {
        let mut config = Config::default();
        config.apply(
            "# netstatfs\n\
             mountpoint: /mnt/net\n\
             promiscuous: false\n\
             queue_capacity: 64\n\
             snaplen: lots\n\
             colour: blue\n\
             no separator here\n",
        );
        assert_eq!(config.mountpoint, Some(PathBuf::from("/mnt/net")));
        assert!(!config.promiscuous);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.snaplen, 1522);
    }

    #[test]
    fn test_derived_configs() {
        let mut config = Config::default();
        config.apply("retry_delay_ms: 20\nread_timeout_ms: 50\nallow_other: true\n");
        assert_eq!(config.session_config().retry_delay, Duration::from_millis(20));
        assert_eq!(config.capture_config().timeout_ms, 50);
        assert!(config.mount_config().allow_other);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "proc_root: /host/proc").unwrap();
        let path = file.path().to_str().unwrap();

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.proc_root, PathBuf::from("/host/proc"));
        assert_eq!(config.config_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yml");
        assert!(Config::load(missing.to_str()).is_err());
    }
}
