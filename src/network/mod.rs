//! Process, socket and packet-capture access.
//!
//! Everything that touches the kernel goes through one of the capability
//! traits (`Procfs`, `InterfaceProvider`, `Capturer`), so the catalogs and
//! the capture session can be exercised against canned data.

pub mod capture;
pub mod interfaces;
pub mod parser;
pub mod privileges;
pub mod process;
pub mod procfs;
pub mod session;
pub mod socket;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use process::{ProcessProvider, ProcfsProcessProvider};
pub use socket::{ProcfsSocketProvider, SocketProvider};
pub use types::{Process, ProcessSocket, Protocol, SocketInfo, TcpState};
