//! Deterministic stand-ins for the kernel-facing capabilities, used by unit tests.

use crate::error::{FsError, Result};
use crate::network::capture::{Capturer, PacketSource, SourceError};
use crate::network::interfaces::{InterfaceProvider, NetInterface};
use crate::network::parser::socket_inode_from_link;
use crate::network::procfs::Procfs;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn key(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn missing(path: &str) -> FsError {
    FsError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file", path),
    ))
}

/// In-memory procfs tree
#[derive(Debug, Default, Clone)]
pub struct FakeProcfs {
    dirs: HashMap<String, Vec<String>>,
    files: HashMap<String, String>,
    links: HashMap<String, String>,
    inodes: HashMap<String, u64>,
}

impl FakeProcfs {
    /// Root with the usual non-process entries
    pub fn new() -> Self {
        Self::default()
            .with_root_entry("self")
            .with_root_entry("net")
            .with_root_entry("sys")
    }

    pub fn with_root_entry(mut self, name: &str) -> Self {
        self.dirs.entry(String::new()).or_default().push(name.to_string());
        self
    }

    pub fn with_process(mut self, pid: u32, name: &str, inode: u64) -> Self {
        let pid_dir = pid.to_string();
        self = self.with_root_entry(&pid_dir);
        self.files.insert(format!("{}/comm", pid), format!("{}\n", name));
        self.dirs.entry(format!("{}/fd", pid)).or_default();
        self.inodes.insert(pid_dir, inode);
        self
    }

    /// Descriptor symlink; socket targets stat to their socket inode
    pub fn with_fd(mut self, pid: u32, fd: u64, target: &str) -> Self {
        let link = format!("{}/fd/{}", pid, fd);
        self.dirs
            .entry(format!("{}/fd", pid))
            .or_default()
            .push(fd.to_string());
        if let Some(inode) = socket_inode_from_link(target) {
            self.inodes.insert(link.clone(), inode);
        }
        self.links.insert(link, target.to_string());
        self
    }

    /// Descriptor listed in the directory but closed before it is resolved
    pub fn with_dangling_fd(mut self, pid: u32, fd: u64) -> Self {
        self.dirs
            .entry(format!("{}/fd", pid))
            .or_default()
            .push(fd.to_string());
        self
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(key(path), content.to_string());
        self
    }
}

impl Procfs for FakeProcfs {
    fn read_dir_names(&self, relative: &str) -> Result<Vec<String>> {
        self.dirs
            .get(&key(relative))
            .cloned()
            .ok_or_else(|| missing(relative))
    }

    fn read_file(&self, relative: &str) -> Result<String> {
        self.files
            .get(&key(relative))
            .cloned()
            .ok_or_else(|| missing(relative))
    }

    fn read_link(&self, relative: &str) -> Result<String> {
        self.links
            .get(&key(relative))
            .cloned()
            .ok_or_else(|| missing(relative))
    }

    fn inode(&self, relative: &str) -> Result<u64> {
        self.inodes
            .get(&key(relative))
            .copied()
            .ok_or_else(|| missing(relative))
    }
}

/// Canned host interfaces
#[derive(Debug, Clone, Default)]
pub struct FakeInterfaces {
    interfaces: Vec<NetInterface>,
}

impl FakeInterfaces {
    pub fn new(interfaces: Vec<NetInterface>) -> Self {
        Self { interfaces }
    }

    /// `lo` with both loopback addresses, `eth0` with 10.0.0.1 and fe80::1
    pub fn host() -> Self {
        Self::new(vec![
            NetInterface {
                name: "lo".to_string(),
                addresses: vec![
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V6(Ipv6Addr::LOCALHOST),
                ],
            },
            NetInterface {
                name: "eth0".to_string(),
                addresses: vec![
                    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                    IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
                ],
            },
        ])
    }
}

impl InterfaceProvider for FakeInterfaces {
    fn interfaces(&self) -> Result<Vec<NetInterface>> {
        Ok(self.interfaces.clone())
    }
}

/// One scripted outcome of a frame read
#[derive(Debug, Clone)]
pub enum Step {
    Frame(Vec<u8>),
    Transient,
    Closed,
}

/// Packet source fed by the test through a channel. An empty script behaves
/// like a read timeout; dropping the script sender ends the stream.
pub struct ScriptedSource {
    steps: Receiver<Step>,
    closed: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new() -> (Self, Sender<Step>) {
        let (tx, rx) = channel::unbounded();
        let source = Self {
            steps: rx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (source, tx)
    }

    /// Set once the source has been dropped, i.e. the handle was closed
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl PacketSource for ScriptedSource {
    fn next_frame(&mut self) -> std::result::Result<Option<Vec<u8>>, SourceError> {
        match self.steps.recv_timeout(Duration::from_millis(10)) {
            Ok(Step::Frame(frame)) => Ok(Some(frame)),
            Ok(Step::Transient) => Err(SourceError::Transient("interface reconfigured".into())),
            Ok(Step::Closed) => Err(SourceError::Closed),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Closed),
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Capturer handing out prepared sources and recording what was opened
#[derive(Default)]
pub struct FakeCapturer {
    sources: Mutex<Vec<ScriptedSource>>,
    opened: Mutex<Vec<(String, String)>>,
    reject: bool,
}

impl FakeCapturer {
    pub fn new(source: ScriptedSource) -> Self {
        Self {
            sources: Mutex::new(vec![source]),
            ..Default::default()
        }
    }

    /// Capturer whose filter installation always fails
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    /// (interface, filter) of every successful open
    pub fn opened(&self) -> Vec<(String, String)> {
        self.opened.lock().unwrap().clone()
    }
}

impl Capturer for FakeCapturer {
    fn open(&self, interface: &str, filter: &str) -> Result<Box<dyn PacketSource>> {
        if self.reject {
            return Err(FsError::Capture(format!("filter '{}' rejected", filter)));
        }
        let source = self
            .sources
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| ScriptedSource::new().0);
        self.opened
            .lock()
            .unwrap()
            .push((interface.to_string(), filter.to_string()));
        Ok(Box::new(source))
    }
}
