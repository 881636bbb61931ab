//! netstatfs library
//!
//! A read-only FUSE filesystem exposing every process's sockets as files;
//! reading a socket file streams the frames captured for its connection.

pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod network;
