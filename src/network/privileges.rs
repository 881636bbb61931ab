//! Privilege detection for packet capture
//!
//! Listing processes and sockets works unprivileged (for the caller's own
//! processes), but opening a socket file starts a live capture which needs
//! root or CAP_NET_RAW. The check only informs; mounting proceeds either way.

use crate::network::procfs::Procfs;
use anyhow::{Result, anyhow};
use log::{debug, info};

/// Capability bit required for raw packet capture
const CAP_NET_RAW: u64 = 13;

/// Privilege check result with detailed information
#[derive(Debug, Clone)]
pub struct PrivilegeStatus {
    /// Whether sufficient privileges are available
    pub has_privileges: bool,
    /// Missing capabilities or permissions
    pub missing: Vec<String>,
    /// Instructions to gain privileges
    pub instructions: Vec<String>,
}

impl PrivilegeStatus {
    pub fn sufficient() -> Self {
        Self {
            has_privileges: true,
            missing: Vec::new(),
            instructions: Vec::new(),
        }
    }

    pub fn insufficient(missing: Vec<String>, instructions: Vec<String>) -> Self {
        Self {
            has_privileges: false,
            missing,
            instructions,
        }
    }

    /// Get a human-readable error message
    pub fn error_message(&self) -> String {
        if self.has_privileges {
            return String::new();
        }

        let mut msg = String::from(
            "Insufficient privileges for packet capture, socket files will not be readable.\n\n",
        );

        if !self.missing.is_empty() {
            msg.push_str("Missing:\n");
            for item in &self.missing {
                msg.push_str(&format!("  - {}\n", item));
            }
            msg.push('\n');
        }

        if !self.instructions.is_empty() {
            msg.push_str("How to fix:\n");
            for (i, instruction) in self.instructions.iter().enumerate() {
                msg.push_str(&format!("  {}. {}\n", i + 1, instruction));
            }
        }

        msg
    }
}

/// Check whether the current process may open live captures
pub fn check_packet_capture_privileges(procfs: &dyn Procfs) -> Result<PrivilegeStatus> {
    let status = procfs
        .read_file("self/status")
        .map_err(|e| anyhow!("Failed to read self/status: {}", e))?;

    if effective_uid(&status) == Some(0) {
        info!("Running as root - all privileges available");
        return Ok(PrivilegeStatus::sufficient());
    }

    debug!("Not running as root, checking capabilities");

    let cap_value = effective_capabilities(&status)
        .ok_or_else(|| anyhow!("Failed to parse effective capabilities"))?;
    debug!("Current effective capabilities: 0x{:x}", cap_value);

    if cap_value & (1u64 << CAP_NET_RAW) != 0 {
        debug!("CAP_NET_RAW: present");
        return Ok(PrivilegeStatus::sufficient());
    }

    debug!("CAP_NET_RAW: missing");
    Ok(PrivilegeStatus::insufficient(
        vec!["CAP_NET_RAW capability (required for packet capture)".to_string()],
        vec![
            "Run with sudo: sudo netstatfs <mountpoint>".to_string(),
            "Set capabilities: sudo setcap 'cap_net_raw=eip' $(which netstatfs)".to_string(),
        ],
    ))
}

/// Effective UID from the `Uid:` line (real, effective, saved, filesystem)
fn effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find(|line| line.starts_with("Uid:"))
        .and_then(|line| line.split_whitespace().nth(2))
        .and_then(|uid| uid.parse().ok())
}

fn effective_capabilities(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("CapEff:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|cap_hex| u64::from_str_radix(cap_hex, 16).ok())
}
