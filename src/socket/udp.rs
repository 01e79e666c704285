use crate::iface::InterfaceInner;
use crate::phy::PacketMeta;
use crate::wire::{IpAddress, IpEndpoint, IpListenEndpoint, IpProtocol, IpRepr, UdpRepr};

/// A UDP packet ring buffer.
pub type PacketBuffer<'a> = crate::storage::PacketBuffer<'a, UdpMetadata>;

/// A UDP packet metadata slot.
pub type PacketMetadata = crate::storage::PacketMetadata<UdpMetadata>;

/// Metadata for a sent or received UDP packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct UdpMetadata {
    /// The peer a received datagram came from, or a sent one is addressed to.
    pub endpoint: IpEndpoint,
    /// The local address a received datagram was sent to.
    pub local_address: Option<IpAddress>,
    pub meta: PacketMeta,
}

impl From<IpEndpoint> for UdpMetadata {
    fn from(endpoint: IpEndpoint) -> Self {
        UdpMetadata {
            endpoint,
            local_address: None,
            meta: PacketMeta::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    Unaddressable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    BufferFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    Exhausted,
}

/// A User Datagram Protocol socket.
///
/// Stateless beyond its bound endpoint and buffers: every `sendto` builds
/// and dispatches a complete datagram immediately.
#[derive(Debug)]
pub struct Socket<'a> {
    endpoint: IpListenEndpoint,
    rx_buffer: PacketBuffer<'a>,
    tx_buffer: PacketBuffer<'a>,
    hop_limit: Option<u8>,
}

impl<'a> Socket<'a> {
    pub fn new(rx_buffer: PacketBuffer<'a>, tx_buffer: PacketBuffer<'a>) -> Socket<'a> {
        Socket {
            endpoint: IpListenEndpoint::default(),
            rx_buffer,
            tx_buffer,
            hop_limit: None,
        }
    }

    pub fn endpoint(&self) -> IpListenEndpoint {
        self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.endpoint.port != 0
    }

    pub fn set_hop_limit(&mut self, hop_limit: Option<u8>) {
        assert_ne!(hop_limit, Some(0));
        self.hop_limit = hop_limit;
    }

    /// Bind to a local endpoint.
    pub fn bind<T: Into<IpListenEndpoint>>(&mut self, endpoint: T) -> Result<(), BindError> {
        let endpoint = endpoint.into();
        if endpoint.port == 0 {
            return Err(BindError::Unaddressable);
        }
        self.endpoint = endpoint;
        self.rx_buffer.clear();
        Ok(())
    }

    pub fn close(&mut self) {
        self.endpoint = IpListenEndpoint::default();
        self.rx_buffer.clear();
        self.tx_buffer.clear();
    }

    pub fn can_send(&self) -> bool {
        !self.tx_buffer.is_full()
    }

    pub fn can_recv(&self) -> bool {
        !self.rx_buffer.is_empty()
    }

    /// Size of the payload storage backing the send queue, fixed at creation.
    pub fn send_capacity(&self) -> usize {
        self.tx_buffer.payload_capacity()
    }

    /// Size of the payload storage backing the receive queue, fixed at creation.
    pub fn recv_capacity(&self) -> usize {
        self.rx_buffer.payload_capacity()
    }

    /// Queue a datagram addressed to `meta.endpoint` for transmission.
    pub fn send_slice(&mut self, data: &[u8], meta: impl Into<UdpMetadata>) -> Result<(), SendError> {
        self.tx_buffer
            .enqueue(data, meta.into())
            .map_err(|_| SendError::BufferFull)
    }

    /// Dequeue the oldest received datagram into `data`, returning its size
    /// and the sender's address (`recvfrom`).
    pub fn recv_slice(&mut self, data: &mut [u8]) -> Result<(usize, UdpMetadata), RecvError> {
        self.rx_buffer
            .dequeue(data)
            .map(|(meta, n)| (n, meta))
            .map_err(|_| RecvError::Exhausted)
    }

    pub(crate) fn accepts(&self, cx: &mut InterfaceInner, ip_repr: &IpRepr, repr: &UdpRepr) -> bool {
        if self.endpoint.port != repr.dst_port {
            return false;
        }
        match self.endpoint.addr {
            Some(addr) => addr == ip_repr.dst_addr() || cx.is_broadcast(&ip_repr.dst_addr()),
            None => true,
        }
    }

    /// Deliver an inbound datagram matched by [`Self::accepts`] into the
    /// receive queue. Silently dropped if the queue is full: unremarkable
    /// backpressure, not a protocol error.
    pub(crate) fn process(
        &mut self,
        _cx: &mut InterfaceInner,
        meta: PacketMeta,
        ip_repr: &IpRepr,
        repr: &UdpRepr,
        payload: &[u8],
    ) {
        let metadata = UdpMetadata {
            endpoint: IpEndpoint::new(ip_repr.src_addr(), repr.src_port),
            local_address: Some(ip_repr.dst_addr()),
            meta,
        };
        let _ = self.rx_buffer.enqueue(payload, metadata);
    }

    pub(crate) fn dispatch<F, E>(&mut self, cx: &mut InterfaceInner, emit: F) -> Result<(), E>
    where
        F: FnOnce(&mut InterfaceInner, PacketMeta, (IpRepr, UdpRepr, &[u8])) -> Result<(), E>,
    {
        let endpoint = self.endpoint;
        let hop_limit = self.hop_limit.unwrap_or(64);

        let mut payload_buf = [0u8; crate::config::MAX_FRAME_PAYLOAD];
        let (meta, n) = match self.tx_buffer.dequeue(&mut payload_buf) {
            Ok(v) => v,
            Err(_) => return Ok(()),
        };
        let payload = &payload_buf[..n];

        let src_addr = match endpoint.addr {
            Some(addr) => addr,
            None => match cx.get_source_address(&meta.endpoint.addr) {
                Some(addr) => addr,
                None => return Ok(()),
            },
        };

        let repr = UdpRepr {
            src_port: endpoint.port,
            dst_port: meta.endpoint.port,
        };
        let ip_repr = IpRepr::new(
            src_addr,
            meta.endpoint.addr,
            IpProtocol::Udp,
            repr.header_len() + payload.len(),
            hop_limit,
        );

        emit(cx, meta.meta, (ip_repr, repr, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PacketMetadata as Meta;

    fn socket() -> Socket<'static> {
        let rx_meta = vec![Meta::EMPTY; 4].leak();
        let rx_payload = vec![0u8; 256].leak();
        let tx_meta = vec![Meta::EMPTY; 4].leak();
        let tx_payload = vec![0u8; 256].leak();
        Socket::new(
            PacketBuffer::new(rx_meta, rx_payload),
            PacketBuffer::new(tx_meta, tx_payload),
        )
    }

    #[test]
    fn unbound_socket_is_not_open() {
        let s = socket();
        assert!(!s.is_open());
        assert_eq!(s.endpoint(), IpListenEndpoint::default());
    }

    #[test]
    fn bind_to_port_zero_is_rejected() {
        let mut s = socket();
        assert_eq!(s.bind(0u16), Err(BindError::Unaddressable));
        assert!(!s.is_open());
    }

    #[test]
    fn bind_then_close_resets_endpoint_and_buffers() {
        let mut s = socket();
        s.bind(9000u16).unwrap();
        assert!(s.is_open());

        s.send_slice(b"queued", IpEndpoint::new(IpAddress::v4(127, 0, 0, 1), 9001))
            .unwrap();
        assert!(s.can_send());

        s.close();
        assert!(!s.is_open());
        assert!(!s.can_send());
    }

    #[test]
    fn send_slice_fills_then_refuses_when_full() {
        let mut s = socket();
        s.bind(9000u16).unwrap();
        let dst = IpEndpoint::new(IpAddress::v4(127, 0, 0, 1), 9001);

        for _ in 0..4 {
            s.send_slice(b"x", dst).unwrap();
        }
        assert_eq!(
            s.send_slice(b"x", dst),
            Err(SendError::BufferFull),
            "metadata ring only holds 4 packets"
        );
    }

    #[test]
    fn recv_slice_on_empty_socket_is_exhausted() {
        let mut s = socket();
        let mut buf = [0u8; 16];
        assert_eq!(s.recv_slice(&mut buf), Err(RecvError::Exhausted));
    }

    #[test]
    fn capacities_reflect_backing_storage() {
        let s = socket();
        assert_eq!(s.send_capacity(), 256);
        assert_eq!(s.recv_capacity(), 256);
    }
}
