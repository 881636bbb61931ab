// fs/fuse.rs - Kernel-facing FUSE adapter over the node tree

use crate::error::FsError;
use crate::fs::tree::{DirEntry, EntryKind, NetstatTree, Node, NodeAttr, ROOT_INODE};
use crate::network::session::{CancelHandle, Cancellation, CaptureSession};
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, Request,
};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

/// Nothing is cached by the kernel, every access reaches the tree
const TTL: Duration = Duration::ZERO;

/// Mount behaviour
#[derive(Debug, Clone, Default)]
pub struct MountConfig {
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl MountConfig {
    pub fn options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::RO,
            MountOption::FSName("netstatfs".to_string()),
            MountOption::Subtype("netstatfs".to_string()),
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
            if !self.allow_other {
                // auto_unmount needs one of the allow_* options
                options.push(MountOption::AllowRoot);
            }
        }
        options
    }
}

/// Nodes the kernel currently knows by inode, with their lookup counts
pub struct NodeTable {
    nodes: HashMap<u64, (Node, u64)>,
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTable {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    pub fn get(&self, inode: u64) -> Option<Node> {
        if inode == ROOT_INODE {
            return Some(Node::Root);
        }
        self.nodes.get(&inode).map(|(node, _)| node.clone())
    }

    /// Record one more kernel reference; a newer node replaces a stale one
    pub fn remember(&mut self, inode: u64, node: Node) {
        if inode == ROOT_INODE {
            return;
        }
        let entry = self.nodes.entry(inode).or_insert((node.clone(), 0));
        entry.0 = node;
        entry.1 += 1;
    }

    pub fn forget(&mut self, inode: u64, count: u64) {
        if let Some((_, lookups)) = self.nodes.get_mut(&inode) {
            *lookups = lookups.saturating_sub(count);
            if *lookups == 0 {
                self.nodes.remove(&inode);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::RegularFile,
    }
}

pub fn file_attr(attr: &NodeAttr, uid: u32, gid: u32) -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        ino: attr.inode,
        size: attr.size,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid,
        gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// Directory listing including `.` and `..`
pub fn listing(inode: u64, entries: Vec<DirEntry>) -> Vec<DirEntry> {
    let mut all = Vec::with_capacity(entries.len() + 2);
    all.push(DirEntry {
        inode,
        name: ".".to_string(),
        kind: EntryKind::Directory,
    });
    all.push(DirEntry {
        inode: ROOT_INODE,
        name: "..".to_string(),
        kind: EntryKind::Directory,
    });
    all.extend(entries);
    all
}

/// Whether open flags request read-only access
pub fn is_read_only(flags: i32) -> bool {
    flags & libc::O_ACCMODE == libc::O_RDONLY
}

pub struct NetstatFs {
    tree: NetstatTree,
    nodes: NodeTable,
    handles: HashMap<u64, Arc<CaptureSession>>,
    next_fh: u64,
    uid: u32,
    gid: u32,
    // dropped on unmount to interrupt every pending read
    shutdown: Option<CancelHandle>,
    shutdown_signal: Cancellation,
}

impl NetstatFs {
    pub fn new(tree: NetstatTree) -> Self {
        let (shutdown, shutdown_signal) = Cancellation::pair();
        // SAFETY: getuid/getgid cannot fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            tree,
            nodes: NodeTable::new(),
            handles: HashMap::new(),
            next_fh: 1,
            uid,
            gid,
            shutdown: Some(shutdown),
            shutdown_signal,
        }
    }

    fn attr_of(&self, node: &Node, inode: u64) -> FileAttr {
        file_attr(&self.tree.attr(node, inode), self.uid, self.gid)
    }

    fn node(&self, inode: u64) -> Result<Node, FsError> {
        self.nodes
            .get(inode)
            .ok_or_else(|| FsError::not_found(format!("inode {}", inode)))
    }
}

impl Filesystem for NetstatFs {
    fn destroy(&mut self) {
        info!("Unmounting, releasing {} open capture(s)", self.handles.len());
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.cancel();
        }
        for (_, session) in self.handles.drain() {
            session.release();
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let result = self
            .node(parent)
            .and_then(|parent| self.tree.lookup(&parent, name));

        match result {
            Ok((node, inode)) => {
                let attr = self.attr_of(&node, inode);
                self.nodes.remember(inode, node);
                reply.entry(&TTL, &attr, 0);
            }
            Err(e) => {
                debug!("lookup {} in {}: {}", name, parent, e);
                reply.error(e.errno());
            }
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.nodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.node(ino) {
            Ok(node) => reply.attr(&TTL, &self.attr_of(&node, ino)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if !is_read_only(flags) {
            reply.error(libc::EACCES);
            return;
        }

        match self.node(ino).and_then(|node| self.tree.open(&node)) {
            Ok(session) => {
                let fh = self.next_fh;
                self.next_fh += 1;
                self.handles.insert(fh, Arc::new(session));
                reply.opened(fh, fuser::consts::FOPEN_DIRECT_IO);
            }
            Err(e) => {
                warn!("open of inode {} failed: {}", ino, e);
                reply.error(e.errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(session) = self.handles.get(&fh).map(Arc::clone) else {
            reply.error(libc::EBADF);
            return;
        };
        // FUSE_INTERRUPT is not forwarded by fuser, so unmount is the only
        // per-read cancellation; release of the handle also wakes the read
        let cancel = self.shutdown_signal.clone();

        // a blocked read must not stall the request loop
        let spawned = thread::Builder::new()
            .name(format!("read-{}", fh))
            .spawn(move || match session.read(size, &cancel) {
                Ok(frame) => reply.data(&frame),
                Err(e) => reply.error(e.errno()),
            });
        if let Err(e) = spawned {
            // the dropped reply answers with EIO
            warn!("Failed to spawn reader for handle {}: {}", fh, e);
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if let Some(session) = self.handles.remove(&fh) {
            session.release();
        }
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.node(ino) {
            Ok(node) if node.kind() == EntryKind::Directory => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.node(ino).and_then(|node| self.tree.entries(&node)) {
            Ok(entries) => listing(ino, entries),
            Err(e) => {
                debug!("readdir {}: {}", ino, e);
                reply.error(e.errno());
                return;
            }
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.into_iter().enumerate().skip(skip) {
            if reply.add(entry.inode, (i + 1) as i64, file_type(entry.kind), &entry.name) {
                break;
            }
        }
        reply.ok();
    }
}

/// Mount the tree and serve requests until unmounted
pub fn mount(tree: NetstatTree, mountpoint: &Path, config: &MountConfig) -> io::Result<()> {
    let options = config.options();
    info!("Mounting on {} with {:?}", mountpoint.display(), options);
    fuser::mount2(NetstatFs::new(tree), mountpoint, &options)
}
