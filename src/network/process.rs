// network/process.rs - procfs-based process catalog

use crate::error::{FsError, Result};
use crate::network::procfs::Procfs;
use crate::network::types::Process;
use log::debug;
use std::sync::Arc;

/// Enumerates running processes
pub trait ProcessProvider: Send + Sync {
    /// All processes currently in the process table
    fn get_processes(&self) -> Result<Vec<Process>>;

    /// A single process, NotFound if it does not exist (any more)
    fn get_process_by_id(&self, id: u32) -> Result<Process>;
}

pub struct ProcfsProcessProvider {
    procfs: Arc<dyn Procfs>,
}

impl ProcfsProcessProvider {
    pub fn new(procfs: Arc<dyn Procfs>) -> Self {
        Self { procfs }
    }

    /// Display name from `comm`, with path separators removed so it can be
    /// used inside a file name
    fn process_name(&self, id: u32) -> Result<String> {
        let comm = self.procfs.read_file(&format!("{}/comm", id))?;
        Ok(comm.trim_end_matches('\n').replace('/', ""))
    }
}

impl ProcessProvider for ProcfsProcessProvider {
    fn get_processes(&self) -> Result<Vec<Process>> {
        let mut processes = Vec::new();

        for entry in self.procfs.read_dir_names("")? {
            let Ok(id) = entry.parse::<u32>() else {
                continue;
            };
            if id == 0 {
                continue;
            }

            match self.process_name(id) {
                Ok(name) => processes.push(Process { id, name }),
                // exited between listing and reading its name
                Err(e) => debug!("Skipping process {}: {}", id, e),
            }
        }

        processes.sort_by_key(|p| p.id);
        Ok(processes)
    }

    fn get_process_by_id(&self, id: u32) -> Result<Process> {
        if id == 0 {
            return Err(FsError::not_found("process 0"));
        }
        match self.process_name(id) {
            Ok(name) => Ok(Process { id, name }),
            Err(e) if e.is_not_found() => Err(FsError::not_found(format!("process {}", id))),
            Err(e) => Err(e),
        }
    }
}
