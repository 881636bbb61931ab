//! Node hierarchy of the mounted filesystem.
//!
//! ```text
//! /                                   root
//! /<pid>_<name>/                      one directory per process
//! /<pid>_<name>/<fd>_<descriptor>     one file per socket descriptor
//! ```
//!
//! Nothing is cached: every listing and lookup reads the process table again.

use crate::error::{FsError, Result};
use crate::fs::inode::{FileIdProvider, ProcfsFileIdProvider};
use crate::network::capture::Capturer;
use crate::network::interfaces::InterfaceProvider;
use crate::network::procfs::Procfs;
use crate::network::session::{CaptureSession, SessionConfig};
use crate::network::{
    Process, ProcessProvider, ProcessSocket, ProcfsProcessProvider, ProcfsSocketProvider,
    SocketProvider,
};
use log::debug;
use std::sync::Arc;

/// Inode of the root directory (the FUSE root id)
pub const ROOT_INODE: u64 = 1;

const DIR_PERM: u16 = 0o555;
const FILE_PERM: u16 = 0o444;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u64,
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Root,
    Process(Process),
    Socket {
        process: Process,
        socket: ProcessSocket,
    },
}

impl Node {
    pub fn kind(&self) -> EntryKind {
        match self {
            Node::Root | Node::Process(_) => EntryKind::Directory,
            Node::Socket { .. } => EntryKind::File,
        }
    }
}

/// Attributes reported for a node. Size is always zero: socket files are
/// endless streams and reads must never be short-circuited by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub inode: u64,
    pub kind: EntryKind,
    pub perm: u16,
    pub size: u64,
    pub nlink: u32,
}

pub fn process_file_name(process: &Process) -> String {
    format!("{}_{}", process.id, process.name)
}

/// Process id from a `<pid>_<name>` entry name
pub fn parse_process_file_name(name: &str) -> Result<u32> {
    let (prefix, _) = name
        .split_once('_')
        .ok_or_else(|| FsError::not_found(name))?;
    match prefix.parse::<u32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(FsError::not_found(name)),
    }
}

/// Descriptor number from a `<fd>_<descriptor>` entry name
pub fn parse_socket_file_name(name: &str) -> Result<u64> {
    let (prefix, _) = name
        .split_once('_')
        .ok_or_else(|| FsError::not_found(name))?;
    prefix.parse::<u64>().map_err(|_| FsError::not_found(name))
}

pub struct NetstatTree {
    processes: Arc<dyn ProcessProvider>,
    sockets: Arc<dyn SocketProvider>,
    file_ids: Arc<dyn FileIdProvider>,
    capturer: Arc<dyn Capturer>,
    session_config: SessionConfig,
}

impl NetstatTree {
    pub fn new(
        processes: Arc<dyn ProcessProvider>,
        sockets: Arc<dyn SocketProvider>,
        file_ids: Arc<dyn FileIdProvider>,
        capturer: Arc<dyn Capturer>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            processes,
            sockets,
            file_ids,
            capturer,
            session_config,
        }
    }

    /// Tree with every catalog reading from the same procfs
    pub fn from_procfs(
        procfs: Arc<dyn Procfs>,
        interfaces: Arc<dyn InterfaceProvider>,
        capturer: Arc<dyn Capturer>,
        session_config: SessionConfig,
    ) -> Self {
        Self::new(
            Arc::new(ProcfsProcessProvider::new(Arc::clone(&procfs))),
            Arc::new(ProcfsSocketProvider::new(Arc::clone(&procfs), interfaces)),
            Arc::new(ProcfsFileIdProvider::new(procfs)),
            capturer,
            session_config,
        )
    }

    pub fn attr(&self, node: &Node, inode: u64) -> NodeAttr {
        match node.kind() {
            EntryKind::Directory => NodeAttr {
                inode,
                kind: EntryKind::Directory,
                perm: DIR_PERM,
                size: 0,
                nlink: 2,
            },
            EntryKind::File => NodeAttr {
                inode,
                kind: EntryKind::File,
                perm: FILE_PERM,
                size: 0,
                nlink: 1,
            },
        }
    }

    /// Entries of a directory node
    pub fn entries(&self, node: &Node) -> Result<Vec<DirEntry>> {
        match node {
            Node::Root => self.root_entries(),
            Node::Process(process) => self.process_entries(process),
            Node::Socket { .. } => Err(FsError::not_found("not a directory")),
        }
    }

    /// Child `name` of a directory node, with its inode
    pub fn lookup(&self, parent: &Node, name: &str) -> Result<(Node, u64)> {
        match parent {
            Node::Root => self.lookup_process(name),
            Node::Process(process) => self.lookup_socket(process, name),
            Node::Socket { .. } => Err(FsError::not_found(name)),
        }
    }

    fn root_entries(&self) -> Result<Vec<DirEntry>> {
        let processes = self.processes.get_processes()?;
        let mut entries = Vec::with_capacity(processes.len());

        for process in processes {
            let inode = match self.file_ids.get_by_process_id(process.id) {
                Ok(inode) => inode,
                Err(e) if e.is_not_found() => {
                    debug!("Process {} exited during listing", process.id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            entries.push(DirEntry {
                inode,
                name: process_file_name(&process),
                kind: EntryKind::Directory,
            });
        }

        Ok(entries)
    }

    fn lookup_process(&self, name: &str) -> Result<(Node, u64)> {
        let id = parse_process_file_name(name)?;
        let process = self.processes.get_process_by_id(id)?;
        let inode = self.file_ids.get_by_process_id(id)?;
        Ok((Node::Process(process), inode))
    }

    fn process_entries(&self, process: &Process) -> Result<Vec<DirEntry>> {
        let sockets = self.sockets.get_sockets(process.id)?;
        let mut entries = Vec::with_capacity(sockets.len());

        for socket in sockets {
            let inode = match self.file_ids.get_by_socket_id(process.id, socket.id) {
                Ok(inode) => inode,
                Err(e) if e.is_not_found() => {
                    debug!("fd {} of process {} closed during listing", socket.id, process.id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            entries.push(DirEntry {
                inode,
                name: socket.to_string(),
                kind: EntryKind::File,
            });
        }

        Ok(entries)
    }

    fn lookup_socket(&self, process: &Process, name: &str) -> Result<(Node, u64)> {
        let fd = parse_socket_file_name(name)?;
        let socket = match self.sockets.get_process_socket(process.id, fd) {
            Ok(socket) => socket,
            // not a socket descriptor: no such entry in this directory
            Err(FsError::Parse(msg)) => return Err(FsError::NotFound(msg)),
            Err(e) => return Err(e),
        };
        let inode = self.file_ids.get_by_socket_id(process.id, fd)?;
        Ok((
            Node::Socket {
                process: process.clone(),
                socket,
            },
            inode,
        ))
    }

    /// Start a capture session for a socket file.
    ///
    /// The socket's tuple is resolved again, since a lookup only carries its
    /// identity. Sockets without a tuple fail with UnsupportedTransport.
    pub fn open(&self, node: &Node) -> Result<CaptureSession> {
        let Node::Socket { process, socket } = node else {
            return Err(FsError::not_found("not a socket file"));
        };

        let resolved = self
            .sockets
            .get_sockets(process.id)?
            .into_iter()
            .find(|s| s.id == socket.id && s.inode == socket.inode)
            .ok_or_else(|| {
                FsError::not_found(format!("fd {} of process {}", socket.id, process.id))
            })?;

        CaptureSession::open(&resolved, self.capturer.as_ref(), self.session_config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::{FakeCapturer, FakeInterfaces, FakeProcfs, ScriptedSource};

    const TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100000A:01BB 050071CB:C738 01 00000000:00000000 00:00000000 00000000  1000        0 5001 1 0000000000000000 20 4 30 10 -1
";

    fn procfs() -> FakeProcfs {
        FakeProcfs::new()
            .with_process(100, "nginx", 9100)
            .with_process(200, "sleep", 9200)
            .with_fd(100, 0, "/dev/null")
            .with_fd(100, 3, "socket:[5001]")
            .with_fd(100, 5, "socket:[5003]")
            .with_file("net/tcp", TCP)
    }

    fn tree_with(capturer: FakeCapturer) -> NetstatTree {
        NetstatTree::from_procfs(
            Arc::new(procfs()),
            Arc::new(FakeInterfaces::host()),
            Arc::new(capturer),
            SessionConfig::default(),
        )
    }

    fn tree() -> NetstatTree {
        tree_with(FakeCapturer::new(ScriptedSource::new().0))
    }

    fn nginx() -> Process {
        Process {
            id: 100,
            name: "nginx".to_string(),
        }
    }

    #[test]
    fn test_path_parsing() {
        assert_eq!(parse_process_file_name("123_bash").unwrap(), 123);
        assert_eq!(parse_process_file_name("123_my_app").unwrap(), 123);
        assert!(matches!(parse_process_file_name("bash"), Err(FsError::NotFound(_))));
        assert!(matches!(parse_process_file_name("0_x"), Err(FsError::NotFound(_))));
        assert!(matches!(parse_process_file_name("-1_x"), Err(FsError::NotFound(_))));
        assert!(matches!(parse_process_file_name("_x"), Err(FsError::NotFound(_))));

        assert_eq!(parse_socket_file_name("3_unknown").unwrap(), 3);
        assert_eq!(parse_socket_file_name("0_tcp_lo_1.2.3.4:1->5.6.7.8:2_LISTEN").unwrap(), 0);
        assert!(parse_socket_file_name("3").is_err());
        assert!(parse_socket_file_name("x_unknown").is_err());
    }

    #[test]
    fn test_root_listing() {
        let entries = tree().entries(&Node::Root).unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    inode: 9100,
                    name: "100_nginx".to_string(),
                    kind: EntryKind::Directory
                },
                DirEntry {
                    inode: 9200,
                    name: "200_sleep".to_string(),
                    kind: EntryKind::Directory
                },
            ]
        );
    }

    #[test]
    fn test_lookup_process() {
        let tree = tree();
        let (node, inode) = tree.lookup(&Node::Root, "100_nginx").unwrap();
        assert_eq!(node, Node::Process(nginx()));
        assert_eq!(inode, 9100);

        for name in ["nginx", "0_x", "300_gone"] {
            let err = tree.lookup(&Node::Root, name).unwrap_err();
            assert!(err.is_not_found(), "{}", name);
        }
    }

    #[test]
    fn test_process_listing() {
        let entries = tree().entries(&Node::Process(nginx())).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "3_tcp_eth0_10.0.0.1:443->203.113.0.5:51000_ESTABLISHED",
                "5_unknown"
            ]
        );
        assert_eq!(entries[0].inode, 5001);
        assert_eq!(entries[1].inode, 5003);
        assert!(entries.iter().all(|e| e.kind == EntryKind::File));
    }

    #[test]
    fn test_lookup_socket_and_attrs() {
        let tree = tree();
        let (node, inode) = tree
            .lookup(&Node::Process(nginx()), "5_unknown")
            .unwrap();
        assert_eq!(inode, 5003);

        let attr = tree.attr(&node, inode);
        assert_eq!(attr.kind, EntryKind::File);
        assert_eq!(attr.perm, 0o444);
        assert_eq!(attr.size, 0);

        let root = tree.attr(&Node::Root, ROOT_INODE);
        assert_eq!(root.kind, EntryKind::Directory);
        assert_eq!(root.perm, 0o555);
    }

    #[test]
    fn test_lookup_non_socket_descriptor() {
        let tree = tree();
        for name in ["0_unknown", "9_unknown", "unknown"] {
            let err = tree.lookup(&Node::Process(nginx()), name).unwrap_err();
            assert!(matches!(err, FsError::NotFound(_)), "{}", name);
        }
    }

    #[test]
    fn test_open_unix_socket_is_unsupported_but_listed() {
        let tree = tree();
        let (node, _) = tree.lookup(&Node::Process(nginx()), "5_unknown").unwrap();
        assert!(matches!(
            tree.open(&node),
            Err(FsError::UnsupportedTransport(_))
        ));

        let entries = tree.entries(&Node::Process(nginx())).unwrap();
        assert!(entries.iter().any(|e| e.name == "5_unknown"));
    }

    #[test]
    fn test_open_tcp_socket_starts_session() {
        let tree = tree();
        let (node, _) = tree
            .lookup(&Node::Process(nginx()), "3_whatever")
            .unwrap();
        let session = tree.open(&node).unwrap();
        assert_eq!(session.interface(), "eth0");
        assert_eq!(
            session.filter(),
            "(host 10.0.0.1) and (host 203.113.0.5) and (tcp port 443) and (tcp port 51000)"
        );
    }

    #[test]
    fn test_open_rejected_filter() {
        let tree = tree_with(FakeCapturer::rejecting());
        let (node, _) = tree.lookup(&Node::Process(nginx()), "3_x").unwrap();
        assert!(matches!(tree.open(&node), Err(FsError::Capture(_))));
    }

    #[test]
    fn test_directories_only_list() {
        let tree = tree();
        let (node, _) = tree.lookup(&Node::Process(nginx()), "3_x").unwrap();
        assert!(tree.entries(&node).is_err());
        assert!(tree.lookup(&node, "1_x").is_err());
        assert!(tree.open(&Node::Root).is_err());
    }
}
