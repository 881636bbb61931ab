//! The mounted filesystem: inode numbering, the node tree and the FUSE adapter.

pub mod fuse;
pub mod inode;
pub mod tree;

pub use fuse::{MountConfig, NetstatFs, mount};
pub use inode::{FileIdProvider, ProcfsFileIdProvider};
pub use tree::{NetstatTree, Node, ROOT_INODE};
