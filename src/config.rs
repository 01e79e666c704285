//! Compile-time tunables for the stack. Grouped here so the fixed-capacity
//! storage decisions called out in the design notes (ARP cache size, socket
//! table size, ...) live in one place instead of being scattered as magic
//! numbers through `iface` and `socket`.

/// Maximum number of entries in the ARP cache.
pub const ARP_CACHE_SIZE: usize = 64;

/// ARP retry interval, in seconds, before a Pending entry is retransmitted.
pub const ARP_RETRY_INTERVAL_SECS: u64 = 1;

/// Number of retransmissions attempted for a Pending ARP entry before it is freed.
pub const ARP_MAX_RETRIES: u8 = 3;

/// Seconds after which a Resolved ARP entry is marked Stale.
pub const ARP_RESOLVED_TIMEOUT_SECS: u64 = 300;

/// Maximum number of routing table entries.
pub const IFACE_MAX_ROUTE_COUNT: usize = 4;

/// Maximum number of endpoints in the socket table.
pub const MAX_SOCKETS: usize = 256;

/// Handles below this offset are reserved for other kernel handle spaces;
/// socket handles returned to applications start here.
pub const SOCKET_HANDLE_BASE: i32 = 1024;

/// Default TCP send/receive ring buffer size.
pub const TCP_DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default TCP retransmission timeout, milliseconds.
pub const TCP_DEFAULT_RTO_MS: u64 = 1000;

/// Maximum SYN/SYN-ACK retransmissions before aborting a connecting socket.
pub const TCP_MAX_RETRIES: u8 = 5;

/// Default maximum segment size advertised at SYN time.
pub const TCP_DEFAULT_MSS: usize = 1460;

/// Duration a destroyed connection lingers in TIME-WAIT.
pub const TCP_TIME_WAIT_SECS: u64 = 60;

/// Default backlog limit for a freshly created listening socket.
pub const TCP_DEFAULT_BACKLOG: usize = 4;

/// Default UDP send/receive payload pool size, shared by every queued datagram.
pub const UDP_DEFAULT_PAYLOAD_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of in-flight datagrams a UDP send/receive queue can hold.
pub const UDP_DEFAULT_METADATA_SLOTS: usize = 32;

/// Ephemeral port range used for outbound connections and implicit binds.
pub const EPHEMERAL_PORT_RANGE: core::ops::RangeInclusive<u16> = 49152..=65535;

/// Maximum Ethernet payload accepted/emitted.
pub const MAX_FRAME_PAYLOAD: usize = 1500;

/// Minimum Ethernet frame length on the wire, including header; short frames
/// are zero-padded up to this length.
pub const MIN_ETHERNET_FRAME_LEN: usize = 64;
