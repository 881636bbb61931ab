// network/capture.rs - Live packet capture primitive and filter synthesis
use crate::error::{FsError, Result};
use crate::network::types::{ProcessSocket, SocketInfo, format_addr};
use pcap::{Active, Capture, Error as PcapError};
use std::io::ErrorKind;
use thiserror::Error;

/// Packet capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Snapshot length (bytes to capture per packet)
    pub snaplen: i32,
    /// Capture in promiscuous mode
    pub promiscuous: bool,
    /// Kernel buffer size per capture handle
    pub buffer_size: i32,
    /// Read timeout in milliseconds, bounds how long the producer takes to
    /// notice a released session
    pub timeout_ms: i32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: 1522,          // Ethernet frame with a VLAN tag
            promiscuous: true,
            buffer_size: 2_000_000, // one handle per open file, keep it small
            timeout_ms: 150,
        }
    }
}

/// Failure of a single frame read
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Temporary unavailability, worth retrying after a short delay
    #[error("capture temporarily unavailable: {0}")]
    Transient(String),
    /// Handle closed or end of stream reached
    #[error("capture handle closed")]
    Closed,
}

/// An open capture handle delivering raw frames
pub trait PacketSource: Send {
    /// Next frame, or None when the read timeout expired without traffic
    fn next_frame(&mut self) -> std::result::Result<Option<Vec<u8>>, SourceError>;
}

/// Opens capture handles bound to an interface with a filter installed
pub trait Capturer: Send + Sync {
    fn open(&self, interface: &str, filter: &str) -> Result<Box<dyn PacketSource>>;
}

/// Capturer backed by libpcap
#[derive(Debug, Clone, Default)]
pub struct PcapCapturer {
    config: CaptureConfig,
}

impl PcapCapturer {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl Capturer for PcapCapturer {
    fn open(&self, interface: &str, filter: &str) -> Result<Box<dyn PacketSource>> {
        log::info!("Opening capture on {} with filter: {}", interface, filter);

        let cap = Capture::from_device(interface)
            .map_err(|e| FsError::Capture(format!("interface {}: {}", interface, e)))?
            .promisc(self.config.promiscuous)
            .snaplen(self.config.snaplen)
            .buffer_size(self.config.buffer_size)
            .timeout(self.config.timeout_ms)
            .immediate_mode(true);

        let mut cap = cap
            .open()
            .map_err(|e| FsError::Capture(format!("failed to open {}: {}", interface, e)))?;

        cap.filter(filter, true)
            .map_err(|e| FsError::Capture(format!("filter '{}' rejected: {}", filter, e)))?;

        log::debug!(
            "Capture on {} ready, linktype {}",
            interface,
            cap.get_datalink().0
        );

        Ok(Box::new(PcapSource { capture: cap }))
    }
}

/// Frames from a libpcap handle; dropping it closes the handle
pub struct PcapSource {
    capture: Capture<Active>,
}

impl PacketSource for PcapSource {
    fn next_frame(&mut self) -> std::result::Result<Option<Vec<u8>>, SourceError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(packet.data.to_vec())),
            Err(PcapError::TimeoutExpired) => Ok(None),
            Err(e) => Err(classify_error(e)),
        }
    }
}

/// Split libpcap errors into end-of-stream and retryable ones
fn classify_error(err: PcapError) -> SourceError {
    match err {
        PcapError::NoMorePackets => SourceError::Closed,
        PcapError::IoError(
            ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof | ErrorKind::NotConnected,
        ) => SourceError::Closed,
        PcapError::PcapError(msg)
            if msg.contains("closed") || msg.contains("Bad file descriptor") =>
        {
            SourceError::Closed
        }
        other => SourceError::Transient(other.to_string()),
    }
}

/// Filter expression selecting the traffic of one connection.
///
/// IPv4-mapped addresses of dual-stack sockets are written in IPv4 form,
/// which is how their frames appear on the wire.
pub fn build_filter(info: &SocketInfo) -> String {
    let mut filter = format!(
        "(host {}) and (host {})",
        format_addr(&info.local_addr.to_canonical()),
        format_addr(&info.remote_addr.to_canonical())
    );
    if let Some(proto) = info.protocol.port_keyword() {
        filter.push_str(&format!(
            " and ({} port {}) and ({} port {})",
            proto, info.local_port, proto, info.remote_port
        ));
    }
    filter
}

/// Interface and filter for a socket, or UnsupportedTransport when the socket
/// has no correlated tuple (unix and netlink sockets never have one)
pub fn capture_target(socket: &ProcessSocket) -> Result<(String, String)> {
    match &socket.info {
        Some(info) => Ok((info.interface.clone(), build_filter(info))),
        None => Err(FsError::UnsupportedTransport(format!(
            "socket inode {} (fd {} of process {}) is not an IP socket",
            socket.inode, socket.id, socket.process_id
        ))),
    }
}
