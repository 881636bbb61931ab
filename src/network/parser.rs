// network/parser.rs - Parsing of procfs socket markers and connection tables

use crate::error::{FsError, Result};
use crate::network::types::TcpState;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Columns a connection-table row must have to carry the inode column
const MIN_TABLE_COLUMNS: usize = 10;

/// One row of a `net/<protocol>` connection table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub state: TcpState,
    pub inode: u64,
}

/// Extract the socket inode from a descriptor symlink target.
///
/// Accepts the modern `socket:[<inode>]` form and the legacy `[0000]:<inode>`
/// form. Anything else is not a socket.
pub fn socket_inode_from_link(target: &str) -> Option<u64> {
    let digits = if let Some(rest) = target.strip_prefix("socket:[") {
        rest.strip_suffix(']')?
    } else if let Some(rest) = target.strip_prefix("[0000]:") {
        rest
    } else {
        return None;
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn check_hex(field: &str) -> Result<()> {
    if field.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(FsError::parse(format!("'{}' is not a hex string", field)))
    }
}

/// Decode an 8 digit kernel-native IPv4 address, e.g. `0100007F` is 127.0.0.1
pub fn decode_ipv4(hex: &str) -> Result<Ipv4Addr> {
    if hex.len() != 8 {
        return Err(FsError::parse(format!("'{}' is not an IPv4 address", hex)));
    }
    check_hex(hex)?;
    let word = u32::from_str_radix(hex, 16)
        .map_err(|e| FsError::parse(format!("'{}': {}", hex, e)))?;
    Ok(Ipv4Addr::from(word.to_le_bytes()))
}

/// Decode a 32 digit IPv6 address printed as four native-endian 32-bit words
pub fn decode_ipv6(hex: &str) -> Result<Ipv6Addr> {
    if hex.len() != 32 {
        return Err(FsError::parse(format!("'{}' is not an IPv6 address", hex)));
    }
    check_hex(hex)?;
    let mut bytes = [0u8; 16];
    for i in 0..4 {
        let chunk = &hex[i * 8..(i + 1) * 8];
        let word = u32::from_str_radix(chunk, 16)
            .map_err(|e| FsError::parse(format!("'{}': {}", hex, e)))?;
        bytes[i * 4..(i + 1) * 4].copy_from_slice(&word.to_le_bytes());
    }
    Ok(Ipv6Addr::from(bytes))
}

/// Decode an address of either width
pub fn decode_addr(hex: &str) -> Result<IpAddr> {
    match hex.len() {
        8 => decode_ipv4(hex).map(IpAddr::V4),
        32 => decode_ipv6(hex).map(IpAddr::V6),
        n => Err(FsError::parse(format!(
            "address '{}' has {} hex digits, expected 8 or 32",
            hex, n
        ))),
    }
}

/// Parse an `ADDR:PORT` field of a connection table
pub fn parse_hex_address(field: &str) -> Result<(IpAddr, u16)> {
    let (addr, port) = field
        .split_once(':')
        .ok_or_else(|| FsError::parse(format!("'{}' is not an address:port pair", field)))?;

    let addr = decode_addr(addr)?;
    if port.is_empty() || port.len() > 4 {
        return Err(FsError::parse(format!("invalid port '{}'", port)));
    }
    check_hex(port)?;
    let port = u16::from_str_radix(port, 16)
        .map_err(|e| FsError::parse(format!("invalid port '{}': {}", port, e)))?;

    Ok((addr, port))
}

/// Data rows of a connection table: header and blank lines are skipped
pub fn table_rows(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
}

fn row_columns(line: &str) -> Result<Vec<&str>> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.len() < MIN_TABLE_COLUMNS {
        return Err(FsError::parse(format!(
            "row has {} columns, expected at least {}: '{}'",
            columns.len(),
            MIN_TABLE_COLUMNS,
            line.trim()
        )));
    }
    Ok(columns)
}

fn inode_column(column: &str) -> Result<u64> {
    column
        .parse::<u64>()
        .map_err(|e| FsError::parse(format!("invalid inode '{}': {}", column, e)))
}

/// Socket inode of a connection-table row, without decoding its addresses
pub fn row_inode(line: &str) -> Result<u64> {
    inode_column(row_columns(line)?[9])
}

/// Parse one data row of a connection table
pub fn parse_table_row(line: &str) -> Result<TableRow> {
    let columns = row_columns(line)?;
    let inode = inode_column(columns[9])?;

    let (local_addr, local_port) = parse_hex_address(columns[1])?;
    let (remote_addr, remote_port) = parse_hex_address(columns[2])?;

    check_hex(columns[3])?;
    let state = u8::from_str_radix(columns[3], 16)
        .map_err(|e| FsError::parse(format!("invalid state '{}': {}", columns[3], e)))?;

    Ok(TableRow {
        local_addr,
        local_port,
        remote_addr,
        remote_port,
        state: TcpState::from_code(state),
        inode,
    })
}
