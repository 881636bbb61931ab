use std::fmt;
use std::net::IpAddr;

/// A running process as seen in the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub id: u32,
    pub name: String,
}

/// Transport protocols with a kernel connection table under `net/`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Tcp6,
    Udp6,
    Raw,
    Raw6,
    UdpLite,
    UdpLite6,
    Icmp,
    Icmp6,
}

impl Protocol {
    /// Tables in the order they are correlated
    pub const ALL: [Protocol; 10] = [
        Protocol::Tcp,
        Protocol::Udp,
        Protocol::Tcp6,
        Protocol::Udp6,
        Protocol::Raw,
        Protocol::Raw6,
        Protocol::UdpLite,
        Protocol::UdpLite6,
        Protocol::Icmp,
        Protocol::Icmp6,
    ];

    /// File name of the connection table, relative to `net/`
    pub fn table_name(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Tcp6 => "tcp6",
            Protocol::Udp6 => "udp6",
            Protocol::Raw => "raw",
            Protocol::Raw6 => "raw6",
            Protocol::UdpLite => "udplite",
            Protocol::UdpLite6 => "udplite6",
            Protocol::Icmp => "icmp",
            Protocol::Icmp6 => "icmp6",
        }
    }

    /// Keyword used for port primitives in a capture filter, if the
    /// transport carries ports the filter language understands
    pub fn port_keyword(&self) -> Option<&'static str> {
        match self {
            Protocol::Tcp | Protocol::Tcp6 => Some("tcp"),
            Protocol::Udp | Protocol::Udp6 => Some("udp"),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Connection state as reported in the `st` column of the connection tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Established,
    SynSent,
    SynRecv,
    FinWait,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    NewSynRecv,
    Unknown(u8),
}

impl TcpState {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => TcpState::Established,
            2 => TcpState::SynSent,
            3 => TcpState::SynRecv,
            4 => TcpState::FinWait,
            5 => TcpState::FinWait2,
            6 => TcpState::TimeWait,
            7 => TcpState::Close,
            8 => TcpState::CloseWait,
            9 => TcpState::LastAck,
            10 => TcpState::Listen,
            11 => TcpState::Closing,
            12 => TcpState::NewSynRecv,
            other => TcpState::Unknown(other),
        }
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TcpState::Established => "ESTABLISHED",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRecv => "SYN_RECV",
            TcpState::FinWait => "FIN_WAIT",
            TcpState::FinWait2 => "FIN_WAIT2",
            TcpState::TimeWait => "TIME_WAIT",
            TcpState::Close => "CLOSE",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::LastAck => "LAST_ACK",
            TcpState::Listen => "LISTEN",
            TcpState::Closing => "CLOSING",
            TcpState::NewSynRecv => "NEW_SYN_RECV",
            TcpState::Unknown(_) => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Correlated connection tuple of one socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    pub protocol: Protocol,
    pub state: TcpState,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    /// Network interface the local address belongs to
    pub interface: String,
}

impl SocketInfo {
    /// Tuple summary used as the file name suffix
    pub fn descriptor(&self) -> String {
        format!(
            "{}_{}_{}:{}->{}:{}_{}",
            self.protocol,
            self.interface,
            format_addr(&self.local_addr),
            self.local_port,
            format_addr(&self.remote_addr),
            self.remote_port,
            self.state
        )
    }
}

/// An open socket descriptor of a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSocket {
    /// Descriptor number, scoped to the owning process
    pub id: u64,
    /// Kernel socket inode
    pub inode: u64,
    pub process_id: u32,
    /// None when the socket could not be correlated with a connection table
    pub info: Option<SocketInfo>,
}

impl ProcessSocket {
    pub fn descriptor(&self) -> String {
        match &self.info {
            Some(info) => info.descriptor(),
            None => "unknown".to_string(),
        }
    }
}

impl fmt::Display for ProcessSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.id, self.descriptor())
    }
}

/// Dotted quad for IPv4, eight zero-padded groups for IPv6
pub fn format_addr(addr: &IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => v6
            .segments()
            .iter()
            .map(|group| format!("{:04x}", group))
            .collect::<Vec<_>>()
            .join(":"),
    }
}
