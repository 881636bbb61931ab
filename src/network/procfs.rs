// network/procfs.rs - Raw access to the process/network-state tree

use crate::error::Result;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Default mount point of procfs
pub const PROC_ROOT: &str = "/proc";

/// Raw reads of the process table. Paths are relative to the procfs root,
/// e.g. `1234/fd` or `net/tcp6`.
pub trait Procfs: Send + Sync {
    /// Names of the entries in a directory
    fn read_dir_names(&self, relative: &str) -> Result<Vec<String>>;

    /// Whole content of a file
    fn read_file(&self, relative: &str) -> Result<String>;

    /// Target of a symbolic link
    fn read_link(&self, relative: &str) -> Result<String>;

    /// Inode of the object a path resolves to, following symlinks
    fn inode(&self, relative: &str) -> Result<u64>;
}

/// Procfs backed by the real filesystem
#[derive(Debug, Clone)]
pub struct LinuxProcfs {
    root: PathBuf,
}

impl LinuxProcfs {
    pub fn new() -> Self {
        Self::with_root(PROC_ROOT)
    }

    /// Procfs rooted somewhere else, e.g. a host procfs bind-mounted into a container
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }
}

impl Default for LinuxProcfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Procfs for LinuxProcfs {
    fn read_dir_names(&self, relative: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.path(relative))? {
            // entries can disappear while the directory is being read
            let Ok(entry) = entry else { continue };
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn read_file(&self, relative: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path(relative))?)
    }

    fn read_link(&self, relative: &str) -> Result<String> {
        let target = fs::read_link(self.path(relative))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn inode(&self, relative: &str) -> Result<u64> {
        Ok(fs::metadata(self.path(relative))?.ino())
    }
}
