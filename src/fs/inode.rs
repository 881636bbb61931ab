// fs/inode.rs - Inode numbers of filesystem nodes, taken from the kernel

use crate::error::{FsError, Result};
use crate::network::procfs::Procfs;
use std::sync::Arc;

/// Resolves the inode number of a process directory or socket file.
///
/// Numbers are the kernel's own inodes of the matching procfs objects, so
/// they are unique and stay stable for the lifetime of the kernel object.
pub trait FileIdProvider: Send + Sync {
    fn get_by_process_id(&self, process_id: u32) -> Result<u64>;

    fn get_by_socket_id(&self, process_id: u32, fd: u64) -> Result<u64>;
}

pub struct ProcfsFileIdProvider {
    procfs: Arc<dyn Procfs>,
}

impl ProcfsFileIdProvider {
    pub fn new(procfs: Arc<dyn Procfs>) -> Self {
        Self { procfs }
    }

    fn stat(&self, path: &str) -> Result<u64> {
        self.procfs.inode(path).map_err(|e| {
            if e.is_not_found() {
                FsError::not_found(path)
            } else {
                e
            }
        })
    }
}

impl FileIdProvider for ProcfsFileIdProvider {
    fn get_by_process_id(&self, process_id: u32) -> Result<u64> {
        self.stat(&process_id.to_string())
    }

    /// Follows the descriptor symlink, so this is the socket inode itself
    fn get_by_socket_id(&self, process_id: u32, fd: u64) -> Result<u64> {
        self.stat(&format!("{}/fd/{}", process_id, fd))
    }
}
