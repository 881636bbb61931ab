// network/socket.rs - Correlation of process descriptors with connection tables

use crate::error::{FsError, Result};
use crate::network::interfaces::{InterfaceProvider, NetInterface, owning_interface};
use crate::network::parser::{parse_table_row, row_inode, socket_inode_from_link, table_rows};
use crate::network::procfs::Procfs;
use crate::network::types::{ProcessSocket, Protocol, SocketInfo};
use log::{debug, warn};
use std::sync::Arc;

/// Enumerates the sockets a process holds
pub trait SocketProvider: Send + Sync {
    /// All socket descriptors of a process, correlated with the connection
    /// tables where possible
    fn get_sockets(&self, process_id: u32) -> Result<Vec<ProcessSocket>>;

    /// A single descriptor resolved to its socket inode, without correlation
    fn get_process_socket(&self, process_id: u32, fd: u64) -> Result<ProcessSocket>;
}

pub struct ProcfsSocketProvider {
    procfs: Arc<dyn Procfs>,
    interfaces: Arc<dyn InterfaceProvider>,
}

impl ProcfsSocketProvider {
    pub fn new(procfs: Arc<dyn Procfs>, interfaces: Arc<dyn InterfaceProvider>) -> Self {
        Self { procfs, interfaces }
    }

    /// Attach connection-table data to the sockets whose inode appears in
    /// one of the tables. Leaves `sockets` sorted by inode.
    fn fill_socket_info(&self, sockets: &mut [ProcessSocket]) -> Result<()> {
        if sockets.is_empty() {
            return Ok(());
        }
        sockets.sort_by_key(|s| s.inode);

        let mut host_interfaces: Option<Vec<NetInterface>> = None;

        for protocol in Protocol::ALL {
            let table = format!("net/{}", protocol.table_name());
            let content = match self.procfs.read_file(&table) {
                Ok(content) => content,
                Err(e) => {
                    // protocol support not compiled in or not loaded
                    debug!("Skipping {}: {}", table, e);
                    continue;
                }
            };

            for line in table_rows(&content) {
                let inode = row_inode(line).map_err(|e| in_table(&table, e))?;

                let start = sockets.partition_point(|s| s.inode < inode);
                let matching = sockets[start..]
                    .iter()
                    .take_while(|s| s.inode == inode)
                    .count();
                if matching == 0 {
                    continue;
                }

                // rows of other processes' sockets are never decoded
                let row = parse_table_row(line).map_err(|e| in_table(&table, e))?;

                if host_interfaces.is_none() {
                    host_interfaces = Some(self.interfaces.interfaces()?);
                }
                let interfaces = host_interfaces.as_deref().unwrap_or_default();

                let interface = match owning_interface(row.local_addr, interfaces) {
                    Ok(name) => name,
                    Err(e) => {
                        warn!("Leaving socket inode {} uncorrelated: {}", row.inode, e);
                        continue;
                    }
                };

                let info = SocketInfo {
                    protocol,
                    state: row.state,
                    local_addr: row.local_addr,
                    local_port: row.local_port,
                    remote_addr: row.remote_addr,
                    remote_port: row.remote_port,
                    interface,
                };
                for socket in &mut sockets[start..start + matching] {
                    socket.info = Some(info.clone());
                }
            }
        }

        Ok(())
    }
}

fn in_table(table: &str, err: FsError) -> FsError {
    match err {
        FsError::Parse(msg) => FsError::Parse(format!("{}: {}", table, msg)),
        other => other,
    }
}

impl SocketProvider for ProcfsSocketProvider {
    fn get_sockets(&self, process_id: u32) -> Result<Vec<ProcessSocket>> {
        let names = match self.procfs.read_dir_names(&format!("{}/fd", process_id)) {
            Ok(names) => names,
            Err(e) if e.is_not_found() => {
                return Err(FsError::not_found(format!("process {}", process_id)));
            }
            Err(e) => return Err(e),
        };

        let mut sockets = Vec::new();
        for name in names {
            let Ok(fd) = name.parse::<u64>() else {
                continue;
            };
            match self.get_process_socket(process_id, fd) {
                Ok(socket) => sockets.push(socket),
                // closed meanwhile, permission denied or not a socket at all
                Err(e) => debug!("Skipping fd {} of process {}: {}", fd, process_id, e),
            }
        }

        self.fill_socket_info(&mut sockets)?;
        sockets.sort_by_key(|s| s.id);

        debug!(
            "Process {} has {} sockets, {} correlated",
            process_id,
            sockets.len(),
            sockets.iter().filter(|s| s.info.is_some()).count()
        );

        Ok(sockets)
    }

    fn get_process_socket(&self, process_id: u32, fd: u64) -> Result<ProcessSocket> {
        let link = format!("{}/fd/{}", process_id, fd);
        let target = match self.procfs.read_link(&link) {
            Ok(target) => target,
            Err(e) if e.is_not_found() => {
                return Err(FsError::not_found(format!(
                    "fd {} of process {}",
                    fd, process_id
                )));
            }
            Err(e) => return Err(e),
        };

        let inode = socket_inode_from_link(&target).ok_or_else(|| {
            FsError::parse(format!(
                "fd {} of process {} is not a socket: {}",
                fd, process_id, target
            ))
        })?;

        Ok(ProcessSocket {
            id: fd,
            inode,
            process_id,
            info: None,
        })
    }
}
