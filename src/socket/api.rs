//! The application-facing endpoint API: integer handles,
//! ephemeral port allocation, and the bind/listen/connect/accept/send/recv
//! surface that funnels down into [`super::tcp`]/[`super::udp`] and the
//! [`Interface`] they're registered with.

use core::fmt;

use crate::config::{
    EPHEMERAL_PORT_RANGE, MAX_SOCKETS, TCP_DEFAULT_BACKLOG, TCP_DEFAULT_BUFFER_SIZE,
    UDP_DEFAULT_METADATA_SLOTS, UDP_DEFAULT_PAYLOAD_BUFFER_SIZE,
};
use crate::config::SOCKET_HANDLE_BASE;
use crate::iface::{Interface, PollResult, SocketHandle as InnerHandle, SocketSet};
use crate::phy::Device;
use crate::socket::{tcp, udp, Socket};
use crate::storage::{PacketBuffer, PacketMetadata, RingBuffer};
use crate::time::{Duration, Instant};
use crate::wire::{IpEndpoint, IpListenEndpoint};

/// An opaque, stable reference to an endpoint created through [`SocketApi`].
///
/// Values are offset by [`SOCKET_HANDLE_BASE`] so they don't alias other
/// kernel handle spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(i32);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "sock#{}", self.0)
    }
}

/// The transport an endpoint was created with. Only one network family is
/// supported, so family isn't tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Stream,
    Datagram,
}

/// Per-endpoint options. Most are recorded but not enforced by the
/// baseline core, matching the cooperative, single-threaded execution model
/// the stack runs under.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub reuse_addr: bool,
    pub broadcast: bool,
    pub keep_alive: Option<Duration>,
    pub recv_timeout: Option<Duration>,
    pub send_timeout: Option<Duration>,
}

/// Errors surfaced at the endpoint boundary, unifying the narrower
/// per-protocol error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    InvalidHandle,
    WrongSocketType,
    AddressInUse,
    Unaddressable,
    WouldBlock,
    NotConnected,
    ConnectionReset,
    BufferFull,
    Exhausted,
    Illegal,
    /// The endpoint table is already at its fixed capacity.
    NoMemory,
}

impl From<tcp::Error> for Error {
    fn from(e: tcp::Error) -> Self {
        match e {
            tcp::Error::InvalidState => Error::Illegal,
            tcp::Error::NotConnected => Error::NotConnected,
            tcp::Error::WouldBlock => Error::WouldBlock,
            tcp::Error::ConnectionReset => Error::ConnectionReset,
            tcp::Error::Illegal => Error::Illegal,
        }
    }
}

impl From<udp::BindError> for Error {
    fn from(_: udp::BindError) -> Self {
        Error::Unaddressable
    }
}

impl From<udp::SendError> for Error {
    fn from(_: udp::SendError) -> Self {
        Error::BufferFull
    }
}

impl From<udp::RecvError> for Error {
    fn from(_: udp::RecvError) -> Self {
        Error::Exhausted
    }
}

struct Entry {
    handle: InnerHandle,
    kind: Kind,
    options: Options,
    /// Local endpoint recorded by `bind`. For TCP this is applied to the
    /// socket itself only once `listen`/`connect` is called; for UDP it's
    /// applied immediately.
    bound: Option<IpListenEndpoint>,
    /// Default destination fixed by `connect` on a datagram endpoint; TCP
    /// tracks its own remote endpoint internally instead.
    default_remote: Option<IpEndpoint>,
}

/// Ties together an [`Interface`], the [`SocketSet`] it polls, and the
/// integer-handle table applications see.
pub struct SocketApi {
    iface: Interface,
    sockets: SocketSet<'static>,
    table: Vec<Option<Entry>>,
    next_ephemeral: u16,
}

impl SocketApi {
    pub fn new(iface: Interface) -> SocketApi {
        SocketApi {
            iface,
            sockets: SocketSet::new(),
            table: Vec::new(),
            next_ephemeral: *EPHEMERAL_PORT_RANGE.start(),
        }
    }

    pub fn interface(&self) -> &Interface {
        &self.iface
    }

    pub fn interface_mut(&mut self) -> &mut Interface {
        &mut self.iface
    }

    /// Drive ingress/egress for every registered endpoint, then reclaim any
    /// that have run their course (TCP sockets that reached Closed).
    pub fn poll(&mut self, timestamp: Instant, device: &mut (impl Device + ?Sized)) -> PollResult {
        let result = self.iface.poll(timestamp, device, &mut self.sockets);
        self.reap_closed();
        result
    }

    pub fn poll_at(&mut self, timestamp: Instant) -> Option<Instant> {
        self.iface.poll_at(timestamp, &self.sockets)
    }

    /// Drive the ~1-second timer tick: TCP retransmission/TIME-WAIT expiry
    /// and overdue ARP retries. Call this from a periodic tick source in
    /// addition to [`Self::poll`], which only reacts to actual packet activity.
    pub fn poll_timers(&mut self, timestamp: Instant, device: &mut (impl Device + ?Sized)) -> PollResult {
        let result = self.iface.poll_timers(timestamp, device, &mut self.sockets);
        self.reap_closed();
        result
    }

    fn entry(&self, handle: Handle) -> Result<&Entry, Error> {
        let index = (handle.0 - SOCKET_HANDLE_BASE) as usize;
        self.table
            .get(index)
            .and_then(|slot| slot.as_ref())
            .ok_or(Error::InvalidHandle)
    }

    fn entry_mut(&mut self, handle: Handle) -> Result<&mut Entry, Error> {
        let index = (handle.0 - SOCKET_HANDLE_BASE) as usize;
        self.table
            .get_mut(index)
            .and_then(|slot| slot.as_mut())
            .ok_or(Error::InvalidHandle)
    }

    /// Whether every slot is occupied and the table has reached [`MAX_SOCKETS`].
    fn table_full(&self) -> bool {
        self.table.len() >= MAX_SOCKETS && self.table.iter().all(Option::is_some)
    }

    fn insert(&mut self, entry: Entry) -> Result<Handle, Error> {
        for (index, slot) in self.table.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return Ok(Handle(SOCKET_HANDLE_BASE + index as i32));
            }
        }
        if self.table.len() >= MAX_SOCKETS {
            return Err(Error::NoMemory);
        }
        self.table.push(Some(entry));
        Ok(Handle(SOCKET_HANDLE_BASE + (self.table.len() - 1) as i32))
    }

    /// Create a new endpoint of the given kind with default buffer sizes
    /// (read-only after creation). Fails once the endpoint table is full.
    pub fn socket(&mut self, kind: Kind) -> Result<Handle, Error> {
        if self.table_full() {
            return Err(Error::NoMemory);
        }

        let handle = match kind {
            Kind::Stream => {
                let rx = leak_bytes(TCP_DEFAULT_BUFFER_SIZE);
                let tx = leak_bytes(TCP_DEFAULT_BUFFER_SIZE);
                let mut socket = tcp::Socket::new(RingBuffer::new(rx), RingBuffer::new(tx));
                socket.set_backlog(TCP_DEFAULT_BACKLOG);
                self.sockets.add(Socket::Tcp(socket))
            }
            Kind::Datagram => {
                let rx_meta = leak_metadata(UDP_DEFAULT_METADATA_SLOTS);
                let rx_payload = leak_bytes(UDP_DEFAULT_PAYLOAD_BUFFER_SIZE);
                let tx_meta = leak_metadata(UDP_DEFAULT_METADATA_SLOTS);
                let tx_payload = leak_bytes(UDP_DEFAULT_PAYLOAD_BUFFER_SIZE);
                let socket = udp::Socket::new(
                    PacketBuffer::new(rx_meta, rx_payload),
                    PacketBuffer::new(tx_meta, tx_payload),
                );
                self.sockets.add(Socket::Udp(socket))
            }
        };

        self.insert(Entry {
            handle,
            kind,
            options: Options::default(),
            bound: None,
            default_remote: None,
        })
    }

    fn is_port_taken(&self, kind: Kind, local: IpListenEndpoint, skip: Handle) -> bool {
        self.table.iter().enumerate().any(|(index, slot)| {
            let Some(entry) = slot else { return false };
            if Handle(SOCKET_HANDLE_BASE + index as i32) == skip || entry.kind != kind {
                return false;
            }
            let Some(bound) = entry.bound else { return false };
            bound.port == local.port
                && (bound.addr.is_none() || local.addr.is_none() || bound.addr == local.addr)
        })
    }

    fn alloc_ephemeral(&mut self, kind: Kind) -> Result<u16, Error> {
        let range = EPHEMERAL_PORT_RANGE;
        for _ in 0..(range.end() - range.start() + 1) {
            let port = self.next_ephemeral;
            self.next_ephemeral = if port == *range.end() {
                *range.start()
            } else {
                port + 1
            };
            let candidate = IpListenEndpoint { addr: None, port };
            if !self.is_port_taken(kind, candidate, Handle(i32::MIN)) {
                return Ok(port);
            }
        }
        Err(Error::AddressInUse)
    }

    /// Assign a local endpoint. Port 0 allocates an ephemeral
    /// port; duplicate (addr, port) pairs are refused unless `reuse_addr` is
    /// set on the endpoint being bound.
    pub fn bind<T: Into<IpListenEndpoint>>(
        &mut self,
        handle: Handle,
        local: T,
    ) -> Result<(), Error> {
        let mut local = local.into();
        let entry = self.entry(handle)?;
        let kind = entry.kind;
        let reuse_addr = entry.options.reuse_addr;

        if local.port == 0 {
            local.port = self.alloc_ephemeral(kind)?;
        } else if !reuse_addr && self.is_port_taken(kind, local, handle) {
            return Err(Error::AddressInUse);
        }

        let inner = self.entry(handle)?.handle;
        if kind == Kind::Datagram {
            let socket: &mut udp::Socket = self.sockets.get_mut(inner);
            socket.bind(local)?;
        }

        self.entry_mut(handle)?.bound = Some(local);
        Ok(())
    }

    /// Start listening; requires a prior `bind` and only applies to
    /// stream endpoints.
    pub fn listen(&mut self, handle: Handle, backlog: usize) -> Result<(), Error> {
        let entry = self.entry(handle)?;
        if entry.kind != Kind::Stream {
            return Err(Error::WrongSocketType);
        }
        let local = entry.bound.ok_or(Error::Illegal)?;
        let inner = entry.handle;

        let socket: &mut tcp::Socket = self.sockets.get_mut(inner);
        socket.listen(local)?;
        socket.set_backlog(backlog);
        Ok(())
    }

    /// Connect: for a stream endpoint this is TcpCore's active open;
    /// for a datagram endpoint it only fixes the default destination used by
    /// a subsequent bare `send`.
    pub fn connect(&mut self, handle: Handle, remote: IpEndpoint) -> Result<(), Error> {
        let kind = self.entry(handle)?.kind;
        match kind {
            Kind::Stream => {
                let local = self.entry(handle)?.bound.unwrap_or_default();
                let inner = self.entry(handle)?.handle;
                let cx = self.iface.context();
                let socket: &mut tcp::Socket = self.sockets.get_mut(inner);
                socket.connect(cx, remote, local)?;
                let assigned = socket.local_endpoint().map(IpListenEndpoint::from);
                self.entry_mut(handle)?.bound = assigned;
                Ok(())
            }
            Kind::Datagram => {
                if self.entry(handle)?.bound.is_none() {
                    self.bind(handle, 0u16)?;
                }
                self.entry_mut(handle)?.default_remote = Some(remote);
                Ok(())
            }
        }
    }

    /// Accept a pending connection on a listening stream endpoint,
    /// spawning a fresh endpoint for it.
    pub fn accept(&mut self, handle: Handle) -> Result<Handle, Error> {
        let entry = self.entry(handle)?;
        if entry.kind != Kind::Stream {
            return Err(Error::WrongSocketType);
        }
        let listen_local = entry.bound.ok_or(Error::Illegal)?;
        let listener_inner = entry.handle;

        if self.table_full() {
            return Err(Error::NoMemory);
        }

        let pending = {
            let socket: &mut tcp::Socket = self.sockets.get_mut(listener_inner);
            socket.accept().ok_or(Error::WouldBlock)?
        };

        let local = IpEndpoint::new(
            listen_local.addr.unwrap_or(pending.local_addr),
            listen_local.port,
        );

        let rx = leak_bytes(TCP_DEFAULT_BUFFER_SIZE);
        let tx = leak_bytes(TCP_DEFAULT_BUFFER_SIZE);
        let mut child = tcp::Socket::new(RingBuffer::new(rx), RingBuffer::new(tx));
        child.accept_into(self.iface.context(), local, pending);
        let inner = self.sockets.add(Socket::Tcp(child));

        self.insert(Entry {
            handle: inner,
            kind: Kind::Stream,
            options: Options::default(),
            bound: Some(IpListenEndpoint::from(local)),
            default_remote: None,
        })
    }

    /// Queue outbound bytes on a stream endpoint, or send to the default
    /// destination fixed by `connect` on a datagram endpoint.
    pub fn send(&mut self, handle: Handle, data: &[u8]) -> Result<usize, Error> {
        let entry = self.entry(handle)?;
        let kind = entry.kind;
        let inner = entry.handle;
        let default_remote = entry.default_remote;
        match kind {
            Kind::Stream => {
                let nonblocking_empty_ok = data.is_empty();
                let socket: &mut tcp::Socket = self.sockets.get_mut(inner);
                let n = socket.send_slice(data)?;
                if n == 0 && !nonblocking_empty_ok && !socket.is_open() {
                    return Err(Error::NotConnected);
                }
                Ok(n)
            }
            Kind::Datagram => {
                let remote = default_remote.ok_or(Error::NotConnected)?;
                self.sendto(handle, data, remote)
            }
        }
    }

    /// Send a datagram to an explicit destination (`sendto`).
    pub fn sendto(&mut self, handle: Handle, data: &[u8], remote: IpEndpoint) -> Result<usize, Error> {
        let entry = self.entry(handle)?;
        if entry.kind != Kind::Datagram {
            return Err(Error::WrongSocketType);
        }
        let inner = entry.handle;
        let socket: &mut udp::Socket = self.sockets.get_mut(inner);
        socket.send_slice(data, remote)?;
        Ok(data.len())
    }

    /// Dequeue received bytes from a stream endpoint.
    pub fn recv(&mut self, handle: Handle, data: &mut [u8]) -> Result<usize, Error> {
        let entry = self.entry(handle)?;
        if entry.kind != Kind::Stream {
            return Err(Error::WrongSocketType);
        }
        let inner = entry.handle;
        let socket: &mut tcp::Socket = self.sockets.get_mut(inner);
        if !socket.can_recv() {
            return if socket.may_recv() {
                Err(Error::WouldBlock)
            } else {
                Err(Error::NotConnected)
            };
        }
        Ok(socket.recv_slice(data)?)
    }

    /// Dequeue the oldest received datagram, returning its size and the
    /// sender's address (`recvfrom`).
    pub fn recvfrom(&mut self, handle: Handle, data: &mut [u8]) -> Result<(usize, IpEndpoint), Error> {
        let entry = self.entry(handle)?;
        if entry.kind != Kind::Datagram {
            return Err(Error::WrongSocketType);
        }
        let inner = entry.handle;
        let socket: &mut udp::Socket = self.sockets.get_mut(inner);
        if !socket.can_recv() {
            return Err(Error::WouldBlock);
        }
        let (n, meta) = socket.recv_slice(data)?;
        Ok((n, meta.endpoint))
    }

    /// Destroy an endpoint. Streams get a graceful shutdown; the
    /// handle and underlying slot are reclaimed once the socket reaches
    /// Closed, via [`Self::poll`]'s bookkeeping pass.
    pub fn close(&mut self, handle: Handle) -> Result<(), Error> {
        let entry = self.entry(handle)?;
        let kind = entry.kind;
        let inner = entry.handle;
        match kind {
            Kind::Stream => {
                let socket: &mut tcp::Socket = self.sockets.get_mut(inner);
                socket.close();
                if socket.state() == tcp::State::Closed {
                    self.remove(handle);
                }
            }
            Kind::Datagram => {
                let socket: &mut udp::Socket = self.sockets.get_mut(inner);
                socket.close();
                self.remove(handle);
            }
        }
        Ok(())
    }

    /// Immediate teardown: RST for streams, idempotent.
    pub fn abort(&mut self, handle: Handle) -> Result<(), Error> {
        let entry = self.entry(handle)?;
        let kind = entry.kind;
        let inner = entry.handle;
        if kind == Kind::Stream {
            let socket: &mut tcp::Socket = self.sockets.get_mut(inner);
            socket.abort();
        }
        self.remove(handle);
        Ok(())
    }

    fn remove(&mut self, handle: Handle) {
        let index = (handle.0 - SOCKET_HANDLE_BASE) as usize;
        if let Some(Some(entry)) = self.table.get_mut(index).map(core::mem::take) {
            self.sockets.remove(entry.handle);
        }
    }

    fn reap_closed(&mut self) {
        let dead: Vec<Handle> = self
            .table
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let entry = slot.as_ref()?;
                if entry.kind != Kind::Stream {
                    return None;
                }
                let socket: &tcp::Socket = self.sockets.get(entry.handle);
                (socket.state() == tcp::State::Closed && entry.default_remote.is_none())
                    .then_some(Handle(SOCKET_HANDLE_BASE + index as i32))
            })
            .collect();
        // A socket only ever reaches Closed again after having been
        // connected at least once; freshly created, never-bound sockets
        // also read as Closed, so only reap ones that were actually bound.
        for handle in dead {
            if self.entry(handle).map(|e| e.bound.is_some()).unwrap_or(false) {
                self.remove(handle);
            }
        }
    }

    pub fn options(&self, handle: Handle) -> Result<Options, Error> {
        Ok(self.entry(handle)?.options)
    }

    pub fn set_reuse_addr(&mut self, handle: Handle, reuse: bool) -> Result<(), Error> {
        self.entry_mut(handle)?.options.reuse_addr = reuse;
        Ok(())
    }

    pub fn set_broadcast(&mut self, handle: Handle, broadcast: bool) -> Result<(), Error> {
        self.entry_mut(handle)?.options.broadcast = broadcast;
        Ok(())
    }

    pub fn set_keep_alive(&mut self, handle: Handle, interval: Option<Duration>) -> Result<(), Error> {
        let entry = self.entry_mut(handle)?;
        entry.options.keep_alive = interval;
        let kind = entry.kind;
        let inner = entry.handle;
        if kind == Kind::Stream {
            let socket: &mut tcp::Socket = self.sockets.get_mut(inner);
            socket.set_keep_alive(interval);
        }
        Ok(())
    }

    pub fn set_recv_timeout(&mut self, handle: Handle, timeout: Option<Duration>) -> Result<(), Error> {
        self.entry_mut(handle)?.options.recv_timeout = timeout;
        Ok(())
    }

    pub fn set_send_timeout(&mut self, handle: Handle, timeout: Option<Duration>) -> Result<(), Error> {
        self.entry_mut(handle)?.options.send_timeout = timeout;
        Ok(())
    }

    pub fn set_nonblocking(&mut self, handle: Handle, nonblocking: bool) -> Result<(), Error> {
        let entry = self.entry(handle)?;
        let kind = entry.kind;
        let inner = entry.handle;
        if kind == Kind::Stream {
            let socket: &mut tcp::Socket = self.sockets.get_mut(inner);
            socket.set_nonblocking(nonblocking);
        }
        Ok(())
    }

    /// Fixed at creation; read-only thereafter.
    pub fn send_buffer_size(&self, handle: Handle) -> Result<usize, Error> {
        let entry = self.entry(handle)?;
        Ok(match entry.kind {
            Kind::Stream => self.sockets.get::<tcp::Socket>(entry.handle).send_capacity(),
            Kind::Datagram => self.sockets.get::<udp::Socket>(entry.handle).send_capacity(),
        })
    }

    pub fn recv_buffer_size(&self, handle: Handle) -> Result<usize, Error> {
        let entry = self.entry(handle)?;
        Ok(match entry.kind {
            Kind::Stream => self.sockets.get::<tcp::Socket>(entry.handle).recv_capacity(),
            Kind::Datagram => self.sockets.get::<udp::Socket>(entry.handle).recv_capacity(),
        })
    }

    /// Retrieve and clear the last asynchronous error recorded on a stream
    /// endpoint.
    pub fn take_error(&mut self, handle: Handle) -> Result<Option<Error>, Error> {
        let entry = self.entry(handle)?;
        if entry.kind != Kind::Stream {
            return Ok(None);
        }
        let inner = entry.handle;
        let socket: &mut tcp::Socket = self.sockets.get_mut(inner);
        Ok(socket.take_last_error().map(Error::from))
    }
}

fn leak_bytes(len: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; len].into_boxed_slice())
}

fn leak_metadata<H: Copy>(slots: usize) -> &'static mut [PacketMetadata<H>] {
    Box::leak(vec![PacketMetadata::EMPTY; slots].into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::Config;
    use crate::phy::{Loopback, Medium};
    use crate::wire::{EthernetAddress, IpAddress, IpCidr};

    fn harness() -> (SocketApi, Loopback) {
        let mut device = Loopback::new(Medium::Ethernet);
        let mut config = Config::new(EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]).into());
        config.random_seed = 0x1234_5678;

        let mut iface = Interface::new(config, &mut device, Instant::from_millis(0));
        iface.update_ip_addrs(|addrs| {
            addrs.push(IpCidr::new(IpAddress::v4(127, 0, 0, 1), 8));
        });

        (SocketApi::new(iface), device)
    }

    // Drive `poll` a bounded number of times, a few milliseconds apart, so a
    // loopback round trip (send -> process -> ack -> process) has enough
    // iterations to settle without looping forever on a stuck test.
    fn run(api: &mut SocketApi, device: &mut Loopback, now: &mut Instant, steps: u32) {
        for _ in 0..steps {
            *now += Duration::from_millis(10);
            api.poll(*now, device);
        }
    }

    #[test]
    fn three_way_handshake_then_ordered_delivery() {
        let (mut api, mut device) = harness();
        let mut now = Instant::from_millis(0);

        let listener = api.socket(Kind::Stream).unwrap();
        api.bind(listener, 80u16).unwrap();
        api.listen(listener, 4).unwrap();

        let client = api.socket(Kind::Stream).unwrap();
        api.connect(client, IpEndpoint::new(IpAddress::v4(127, 0, 0, 1), 80))
            .unwrap();

        let mut server = None;
        for _ in 0..20 {
            run(&mut api, &mut device, &mut now, 1);
            if let Ok(h) = api.accept(listener) {
                server = Some(h);
                break;
            }
        }
        let server = server.expect("listener should have accepted the connection");

        run(&mut api, &mut device, &mut now, 5);

        api.send(client, b"HELLO").unwrap();
        api.send(client, b"WORLD").unwrap();
        run(&mut api, &mut device, &mut now, 10);

        let mut buf = [0u8; 32];
        let n = api.recv(server, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"HELLOWORLD");
    }

    #[test]
    fn graceful_close_runs_through_fin_sequence() {
        let (mut api, mut device) = harness();
        let mut now = Instant::from_millis(0);

        let listener = api.socket(Kind::Stream).unwrap();
        api.bind(listener, 81u16).unwrap();
        api.listen(listener, 1).unwrap();

        let client = api.socket(Kind::Stream).unwrap();
        api.connect(client, IpEndpoint::new(IpAddress::v4(127, 0, 0, 1), 81))
            .unwrap();

        let mut server = None;
        for _ in 0..20 {
            run(&mut api, &mut device, &mut now, 1);
            if let Ok(h) = api.accept(listener) {
                server = Some(h);
                break;
            }
        }
        let server = server.expect("listener should have accepted the connection");
        run(&mut api, &mut device, &mut now, 5);

        api.close(client).unwrap();
        run(&mut api, &mut device, &mut now, 10);

        // The server side observed the peer's FIN and should see recv()
        // report "not connected" (vs. "would block") once its own half is
        // drained, rather than hanging forever.
        let mut buf = [0u8; 4];
        match api.recv(server, &mut buf) {
            Err(Error::NotConnected) | Ok(0) => {}
            other => panic!("expected the server side to observe the close, got {other:?}"),
        }

        api.close(server).ok();
    }

    #[test]
    fn port_reuse_is_refused_without_reuse_addr() {
        let (mut api, _device) = harness();

        let first = api.socket(Kind::Datagram).unwrap();
        api.bind(first, 9000u16).unwrap();

        let second = api.socket(Kind::Datagram).unwrap();
        assert_eq!(api.bind(second, 9000u16), Err(Error::AddressInUse));

        api.set_reuse_addr(second, true).unwrap();
        assert!(api.bind(second, 9000u16).is_ok());
    }

    #[test]
    fn udp_sendto_recvfrom_round_trip() {
        let (mut api, mut device) = harness();
        let mut now = Instant::from_millis(0);

        let server = api.socket(Kind::Datagram).unwrap();
        api.bind(server, 7u16).unwrap();

        let client = api.socket(Kind::Datagram).unwrap();
        api.bind(client, 0u16).unwrap();

        let server_addr = IpEndpoint::new(IpAddress::v4(127, 0, 0, 1), 7);
        api.sendto(client, b"ping", server_addr).unwrap();
        run(&mut api, &mut device, &mut now, 3);

        let mut buf = [0u8; 8];
        let (n, from) = api.recvfrom(server, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from.port, api.entry(client).unwrap().bound.unwrap().port);
    }

    #[test]
    fn socket_is_refused_once_the_endpoint_table_is_full() {
        let (mut api, _device) = harness();

        for _ in 0..MAX_SOCKETS {
            api.socket(Kind::Datagram).unwrap();
        }
        assert_eq!(api.socket(Kind::Datagram), Err(Error::NoMemory));
    }

    #[test]
    fn a_closed_endpoint_frees_its_slot_for_reuse() {
        let (mut api, _device) = harness();

        for _ in 0..MAX_SOCKETS - 1 {
            api.socket(Kind::Datagram).unwrap();
        }
        let last = api.socket(Kind::Datagram).unwrap();
        assert_eq!(api.socket(Kind::Datagram), Err(Error::NoMemory));

        api.close(last).unwrap();
        assert!(api.socket(Kind::Datagram).is_ok());
    }
}
