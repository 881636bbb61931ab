//! Host network interfaces and attribution of local addresses to them.

use crate::error::{FsError, Result};
use log::debug;
use pcap::Device;
use std::net::IpAddr;

/// Pseudo-interface capturing on every interface (Linux only)
pub const ANY_INTERFACE: &str = "any";

/// A host interface with its bound addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

/// Enumerates host interfaces
pub trait InterfaceProvider: Send + Sync {
    fn interfaces(&self) -> Result<Vec<NetInterface>>;
}

/// Interface enumeration through libpcap's device list, which is also the
/// set of names a live capture can be bound to
#[derive(Debug, Default, Clone, Copy)]
pub struct PcapInterfaceProvider;

impl InterfaceProvider for PcapInterfaceProvider {
    fn interfaces(&self) -> Result<Vec<NetInterface>> {
        let devices = Device::list()
            .map_err(|e| FsError::Capture(format!("failed to list network devices: {}", e)))?;

        debug!("Found {} network devices", devices.len());

        Ok(devices
            .into_iter()
            .map(|device| NetInterface {
                addresses: device.addresses.iter().map(|a| a.addr).collect(),
                name: device.name,
            })
            .collect())
    }
}

/// Find the interface a local socket address belongs to.
///
/// Exact address match first (IPv4-mapped IPv6 addresses compare as IPv4).
/// Wildcard addresses map to the `any` pseudo-interface, loopback-class
/// addresses without an exact match to the host's loopback interface.
pub fn owning_interface(addr: IpAddr, interfaces: &[NetInterface]) -> Result<String> {
    let addr = addr.to_canonical();

    if let Some(iface) = interfaces
        .iter()
        .find(|i| i.addresses.iter().any(|a| a.to_canonical() == addr))
    {
        return Ok(iface.name.clone());
    }

    if addr.is_unspecified() {
        return Ok(ANY_INTERFACE.to_string());
    }

    if addr.is_loopback()
        && let Some(iface) = interfaces
            .iter()
            .find(|i| i.addresses.iter().any(|a| a.is_loopback()))
    {
        return Ok(iface.name.clone());
    }

    Err(FsError::not_found(format!("no interface owns address {}", addr)))
}
