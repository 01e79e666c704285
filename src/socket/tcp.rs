//! The 11-state reliable stream protocol.
//!
//! Sequence arithmetic, buffering and retransmission live here; `process`
//! and `dispatch` are the two entry points the interface glue calls on
//! every inbound segment and every egress pass, respectively.

use crate::iface::InterfaceInner;
use crate::storage::RingBuffer;
use crate::time::{Duration, Instant};
use crate::wire::{
    IpAddress, IpEndpoint, IpListenEndpoint, IpProtocol, IpRepr, TcpControl, TcpRepr, TcpSeqNumber,
};

use crate::config::{
    TCP_DEFAULT_BACKLOG, TCP_DEFAULT_MSS, TCP_DEFAULT_RTO_MS, TCP_MAX_RETRIES, TCP_TIME_WAIT_SECS,
};

/// A TCP ring buffer, backing both the send and receive side.
pub type SocketBuffer<'a> = RingBuffer<'a, u8>;

/// The state of a TCP socket.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

/// Errors surfaced at the socket boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    InvalidState,
    NotConnected,
    WouldBlock,
    ConnectionReset,
    Illegal,
}

/// An entry on a [`State::Listen`] socket's pending-connection queue.
#[derive(Debug, Clone, Copy)]
pub struct Pending {
    pub remote: IpEndpoint,
    /// The inbound SYN's actual destination address, so a wildcard-bound
    /// listener spawns a child bound to the address it was really reached
    /// at rather than to the peer's own address.
    pub local_addr: IpAddress,
    pub irs: TcpSeqNumber,
    pub mss: usize,
}

const MAX_BACKLOG: usize = 8;

/// A Transmission Control Protocol socket.
#[derive(Debug)]
pub struct Socket<'a> {
    state: State,

    local_endpoint: Option<IpEndpoint>,
    remote_endpoint: Option<IpEndpoint>,
    /// Address/port passed to `listen()`; restored when reset back to Listen.
    listen_endpoint: IpListenEndpoint,
    backlog: usize,
    pending: heapless::Vec<Pending, MAX_BACKLOG>,

    tx_buffer: SocketBuffer<'a>,
    rx_buffer: SocketBuffer<'a>,

    /// Oldest unacknowledged sequence number.
    snd_una: TcpSeqNumber,
    /// Next sequence number to send.
    snd_nxt: TcpSeqNumber,
    /// Peer-advertised window, in bytes, relative to `snd_una`... tracked as
    /// an absolute byte count for simplicity (no window scaling).
    snd_wnd: usize,
    /// Initial send sequence number.
    iss: TcpSeqNumber,

    /// Next expected sequence number.
    rcv_nxt: TcpSeqNumber,
    /// Initial receive sequence number.
    irs: TcpSeqNumber,

    /// Sequence number of our FIN, once queued for transmission.
    fin_seq: Option<TcpSeqNumber>,
    /// Set once the application has requested a close.
    close_requested: bool,
    /// A bare ACK (no data, no new control bit) is owed to the peer.
    ack_pending: bool,

    mss: usize,
    rto: Duration,
    retries: u8,
    /// When the current unacknowledged SYN/SYN-ACK/FIN was last (re)sent.
    last_send_at: Option<Instant>,
    time_wait_at: Option<Instant>,

    nonblocking: bool,
    keep_alive: Option<Duration>,
    last_error: Option<Error>,
}

impl<'a> Socket<'a> {
    pub fn new(rx_buffer: SocketBuffer<'a>, tx_buffer: SocketBuffer<'a>) -> Socket<'a> {
        Socket {
            state: State::Closed,
            local_endpoint: None,
            remote_endpoint: None,
            listen_endpoint: IpListenEndpoint::default(),
            backlog: TCP_DEFAULT_BACKLOG,
            pending: heapless::Vec::new(),
            tx_buffer,
            rx_buffer,
            snd_una: TcpSeqNumber(0),
            snd_nxt: TcpSeqNumber(0),
            snd_wnd: 0,
            iss: TcpSeqNumber(0),
            rcv_nxt: TcpSeqNumber(0),
            irs: TcpSeqNumber(0),
            fin_seq: None,
            close_requested: false,
            ack_pending: false,
            mss: TCP_DEFAULT_MSS,
            rto: Duration::from_millis(TCP_DEFAULT_RTO_MS),
            retries: 0,
            last_send_at: None,
            time_wait_at: None,
            nonblocking: false,
            keep_alive: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.nonblocking = nonblocking;
    }

    pub fn set_keep_alive(&mut self, interval: Option<Duration>) {
        self.keep_alive = interval;
    }

    pub fn local_endpoint(&self) -> Option<IpEndpoint> {
        self.local_endpoint
    }

    pub fn remote_endpoint(&self) -> Option<IpEndpoint> {
        self.remote_endpoint
    }

    pub fn take_last_error(&mut self) -> Option<Error> {
        self.last_error.take()
    }

    pub fn is_open(&self) -> bool {
        self.state != State::Closed
    }

    pub fn may_send(&self) -> bool {
        matches!(
            self.state,
            State::Established | State::CloseWait
        )
    }

    pub fn may_recv(&self) -> bool {
        matches!(
            self.state,
            State::Established | State::FinWait1 | State::FinWait2
        ) || (matches!(self.state, State::CloseWait | State::Closing | State::LastAck)
            && !self.rx_buffer.is_empty())
    }

    fn reset_to_closed(&mut self) {
        self.state = State::Closed;
        self.local_endpoint = None;
        self.remote_endpoint = None;
        self.fin_seq = None;
        self.close_requested = false;
        self.ack_pending = false;
        self.retries = 0;
        self.last_send_at = None;
        self.time_wait_at = None;
        self.tx_buffer.clear();
        self.rx_buffer.clear();
    }

    /// Passive open: start listening on `local` (Closed -> Listen).
    pub fn listen<T: Into<IpListenEndpoint>>(&mut self, local: T) -> Result<(), Error> {
        let local = local.into();
        if local.port == 0 {
            return Err(Error::Illegal);
        }
        self.reset_to_closed();
        self.listen_endpoint = local;
        self.state = State::Listen;
        Ok(())
    }

    /// Active open: send a SYN to `remote` (Closed -> SynSent).
    pub fn connect(
        &mut self,
        cx: &mut InterfaceInner,
        remote: IpEndpoint,
        local: IpListenEndpoint,
    ) -> Result<(), Error> {
        if self.state != State::Closed {
            return Err(Error::Illegal);
        }
        let local_addr = match local.addr {
            Some(addr) => addr,
            None => cx
                .get_source_address(&remote.addr)
                .ok_or(Error::Illegal)?,
        };

        self.reset_to_closed();
        let iss = initial_seq_number(cx);
        self.iss = iss;
        self.snd_una = iss;
        self.snd_nxt = iss + 1;
        self.snd_wnd = 0;
        self.local_endpoint = Some(IpEndpoint::new(local_addr, local.port));
        self.remote_endpoint = Some(remote);
        self.state = State::SynSent;
        self.last_send_at = None;
        self.retries = 0;
        Ok(())
    }

    /// Queue data for transmission; returns the number of bytes accepted.
    pub fn send_slice(&mut self, data: &[u8]) -> Result<usize, Error> {
        if !self.may_send() {
            return Err(Error::NotConnected);
        }
        Ok(self.tx_buffer.enqueue_slice(data))
    }

    /// Copy received, in-order bytes out of the receive buffer.
    pub fn recv_slice(&mut self, data: &mut [u8]) -> Result<usize, Error> {
        if self.state == State::Closed || self.state == State::Listen {
            return Err(Error::NotConnected);
        }
        Ok(self.rx_buffer.dequeue_slice(data))
    }

    pub fn can_send(&self) -> bool {
        self.may_send() && self.tx_buffer.window() > 0
    }

    pub fn can_recv(&self) -> bool {
        !self.rx_buffer.is_empty()
    }

    /// Size of the send buffer, fixed at socket creation.
    pub fn send_capacity(&self) -> usize {
        self.tx_buffer.capacity()
    }

    /// Size of the receive buffer, fixed at socket creation.
    pub fn recv_capacity(&self) -> usize {
        self.rx_buffer.capacity()
    }

    /// Graceful close: Established sends FIN -> FinWait1; CloseWait
    /// sends FIN -> LastAck. A Listen or not-yet-connected socket just resets.
    pub fn close(&mut self) {
        match self.state {
            State::Established => {
                self.state = State::FinWait1;
                self.close_requested = true;
            }
            State::CloseWait => {
                self.state = State::LastAck;
                self.close_requested = true;
            }
            State::Listen | State::SynSent => self.reset_to_closed(),
            _ => {}
        }
    }

    /// Immediate, idempotent teardown: send RST (unless already Closed) and
    /// destroy the socket. A second call on an already-destroyed socket is a
    /// defined no-op.
    pub fn abort(&mut self) {
        self.reset_to_closed();
    }

    /// A pending connection is ready to be handed off: pop it (`accept`).
    pub fn accept(&mut self) -> Option<Pending> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn set_backlog(&mut self, backlog: usize) {
        self.backlog = backlog.min(MAX_BACKLOG);
    }

    /// Initialize a freshly-allocated socket as the child spawned by
    /// accepting `pending` on a listening socket bound to `local`; enters
    /// SynReceived, ready to emit SYN+ACK on the next dispatch.
    pub fn accept_into(&mut self, cx: &mut InterfaceInner, local: IpEndpoint, pending: Pending) {
        self.reset_to_closed();
        let iss = initial_seq_number(cx);
        self.iss = iss;
        self.snd_una = iss;
        self.snd_nxt = iss + 1;
        self.irs = pending.irs;
        self.rcv_nxt = pending.irs + 1;
        self.mss = self.mss.min(pending.mss);
        self.local_endpoint = Some(local);
        self.remote_endpoint = Some(pending.remote);
        self.state = State::SynReceived;
        self.last_send_at = None;
        self.retries = 0;
    }

    /// Whether an inbound segment is addressed to this socket.
    ///
    /// Exact 4-tuple match for connected sockets; Listen sockets match on
    /// destination port (and, if bound to a specific address, that address).
    pub(crate) fn accepts(&self, ip_repr: &IpRepr, repr: &TcpRepr) -> bool {
        match self.state {
            State::Closed => false,
            State::Listen => {
                repr.dst_port == self.listen_endpoint.port
                    && self
                        .listen_endpoint
                        .addr
                        .map_or(true, |addr| addr == ip_repr.dst_addr())
            }
            _ => {
                let local = match self.local_endpoint {
                    Some(e) => e,
                    None => return false,
                };
                let remote = match self.remote_endpoint {
                    Some(e) => e,
                    None => return false,
                };
                local.addr == ip_repr.dst_addr()
                    && local.port == repr.dst_port
                    && remote.addr == ip_repr.src_addr()
                    && remote.port == repr.src_port
            }
        }
    }

    /// Handle an inbound segment already matched by [`Self::accepts`].
    pub(crate) fn process(&mut self, now: Instant, ip_repr: &IpRepr, repr: &TcpRepr) {
        self.retries = 0;

        if repr.control == TcpControl::Rst {
            if self.state != State::Listen {
                self.last_error = Some(Error::ConnectionReset);
                self.reset_to_closed();
            }
            return;
        }

        match self.state {
            State::Listen => self.process_listen(ip_repr, repr),
            State::SynSent => self.process_syn_sent(now, repr),
            _ => self.process_connected(now, repr),
        }
    }

    fn process_listen(&mut self, ip_repr: &IpRepr, repr: &TcpRepr) {
        if repr.control != TcpControl::Syn {
            return;
        }
        if self.pending.len() >= self.backlog {
            return;
        }
        let remote = IpEndpoint::new(ip_repr.src_addr(), repr.src_port);
        let _ = self.pending.push(Pending {
            remote,
            local_addr: ip_repr.dst_addr(),
            irs: repr.seq_number,
            mss: repr.max_seg_size.map(|m| m as usize).unwrap_or(self.mss),
        });
    }

    fn process_syn_sent(&mut self, now: Instant, repr: &TcpRepr) {
        match (repr.control, repr.ack_number) {
            (TcpControl::Syn, Some(ack)) if ack == self.snd_nxt => {
                // SYN+ACK: three-way handshake's second leg.
                self.irs = repr.seq_number;
                self.rcv_nxt = repr.seq_number + 1;
                self.snd_una = ack;
                self.snd_wnd = repr.window_len as usize;
                self.state = State::Established;
                self.ack_pending = true;
                self.last_send_at = None;
            }
            (TcpControl::Syn, None) => {
                // Simultaneous open: bare SYN, no ACK.
                self.irs = repr.seq_number;
                self.rcv_nxt = repr.seq_number + 1;
                self.state = State::SynReceived;
                self.ack_pending = true;
                self.last_send_at = None;
            }
            _ => {}
        }
        let _ = now;
    }

    fn process_connected(&mut self, now: Instant, repr: &TcpRepr) {
        // Acceptable-ACK check: snd_una < ack <= snd_nxt.
        if let Some(ack) = repr.ack_number {
            if ack > self.snd_una && ack <= self.snd_nxt {
                let advanced = ack - self.snd_una;
                // Optimistic consumption: the send ring was already drained
                // when the bytes were first transmitted, so acceptance just
                // advances the watermark (see design notes on retransmission).
                self.snd_una = ack;
                self.snd_wnd = repr.window_len as usize;
                let _ = advanced;

                if self.state == State::SynReceived {
                    self.state = State::Established;
                }
                if let Some(fin_seq) = self.fin_seq {
                    if ack > fin_seq {
                        match self.state {
                            State::FinWait1 => {
                                self.state = State::FinWait2;
                            }
                            State::Closing => self.enter_time_wait(now),
                            State::LastAck => {
                                self.reset_to_closed();
                                return;
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        if self.state == State::TimeWait {
            // Absorb retransmitted FINs with a bare ACK; ignore everything else.
            if repr.control == TcpControl::Fin {
                self.ack_pending = true;
            }
            return;
        }

        let in_order = matches!(
            self.state,
            State::Established | State::FinWait1 | State::FinWait2
        );

        if in_order {
            if repr.seq_number == self.rcv_nxt {
                if !repr.payload.is_empty() {
                    let n = self.rx_buffer.enqueue_slice(repr.payload);
                    self.rcv_nxt += n;
                }
                if repr.control == TcpControl::Fin {
                    self.rcv_nxt += 1;
                    match self.state {
                        State::Established => self.state = State::CloseWait,
                        State::FinWait1 => self.enter_time_wait(now),
                        State::FinWait2 => self.enter_time_wait(now),
                        _ => {}
                    }
                }
                self.ack_pending = true;
            } else {
                // Out-of-order: drop the whole segment, elicit a duplicate ACK.
                self.ack_pending = true;
            }
        } else if repr.control == TcpControl::Fin && self.state == State::Closing {
            self.ack_pending = true;
        }
    }

    fn enter_time_wait(&mut self, now: Instant) {
        self.state = State::TimeWait;
        self.time_wait_at = Some(now + Duration::from_secs(TCP_TIME_WAIT_SECS));
    }

    /// Timer maintenance: SYN/SYN-ACK/FIN retransmission and TIME-WAIT expiry.
    /// Returns `true` if the socket was just destroyed.
    pub(crate) fn poll_timers(&mut self, now: Instant) -> bool {
        if self.state == State::TimeWait {
            if let Some(at) = self.time_wait_at {
                if now >= at {
                    self.reset_to_closed();
                    return true;
                }
            }
        }

        if matches!(self.state, State::SynSent | State::SynReceived) {
            if let Some(last) = self.last_send_at {
                let deadline = self.rto * (self.retries as u32 + 1);
                if now - last >= deadline {
                    if self.retries >= TCP_MAX_RETRIES {
                        self.last_error = Some(Error::ConnectionReset);
                        self.reset_to_closed();
                        return true;
                    }
                    self.retries += 1;
                    self.last_send_at = None; // force a resend on next dispatch
                }
            }
        }
        false
    }

    fn needs_syn(&self) -> bool {
        matches!(self.state, State::SynSent | State::SynReceived)
    }

    fn needs_fin(&self) -> bool {
        matches!(self.state, State::FinWait1 | State::Closing | State::LastAck)
            && self.fin_seq.is_none()
    }

    /// Bytes still waiting to go out. Consumption is optimistic (see design
    /// notes): a byte leaves `tx_buffer` the moment it is handed to
    /// `dispatch`, not when its ACK arrives, so this is simply the buffer's
    /// current length.
    fn unsent(&self) -> usize {
        self.tx_buffer.len()
    }

    pub(crate) fn poll_at(&self, now: Instant) -> Option<Instant> {
        match self.state {
            State::Closed | State::Listen => None,
            State::TimeWait => self.time_wait_at,
            _ => {
                if self.ack_pending || self.unsent() > 0 || self.needs_fin() {
                    Some(now)
                } else if self.needs_syn() {
                    self.last_send_at
                        .map(|t| t + self.rto * (self.retries as u32 + 1))
                } else {
                    None
                }
            }
        }
    }

    /// Emit exactly one outbound segment, if one is due.
    pub(crate) fn dispatch<F, E>(&mut self, cx: &mut InterfaceInner, emit: F) -> Result<(), E>
    where
        F: FnOnce(&mut InterfaceInner, (IpRepr, TcpRepr)) -> Result<(), E>,
    {
        let (local, remote) = match (self.local_endpoint, self.remote_endpoint) {
            (Some(l), Some(r)) => (l, r),
            _ => return Ok(()),
        };

        if self.needs_syn() && self.last_send_at.is_some() {
            // Waiting on the retransmit deadline; nothing to do yet.
            return Ok(());
        }

        let mut control = TcpControl::None;
        let mut payload_len = 0usize;
        let mut max_seg_size = None;

        if self.needs_syn() {
            control = TcpControl::Syn;
            max_seg_size = Some(self.mss as u16);
            self.last_send_at = Some(cx.now());
        } else {
            let window = self.snd_wnd.max(self.mss);
            let unsent = self.unsent().min(window).min(self.mss);
            payload_len = unsent;

            if payload_len == 0 && self.needs_fin() {
                control = TcpControl::Fin;
                self.fin_seq = Some(self.snd_nxt);
            }
        }

        if control == TcpControl::None && payload_len == 0 && !self.ack_pending {
            return Ok(());
        }

        let seq_number = self.snd_nxt;
        let mut scratch = [0u8; crate::config::MAX_FRAME_PAYLOAD];
        if payload_len > 0 {
            let n = self.tx_buffer.dequeue_slice(&mut scratch[..payload_len]);
            debug_assert_eq!(n, payload_len);
        }

        let ack_number = if matches!(self.state, State::SynSent) {
            None
        } else {
            Some(self.rcv_nxt)
        };

        let repr = TcpRepr {
            src_port: local.port,
            dst_port: remote.port,
            control,
            seq_number,
            ack_number,
            window_len: self.rx_buffer.window().min(u16::MAX as usize) as u16,
            max_seg_size,
            payload: &scratch[..payload_len],
        };

        self.snd_nxt = self.snd_nxt + repr.segment_len();
        self.ack_pending = false;

        let ip_repr = IpRepr::new(
            local.addr,
            remote.addr,
            IpProtocol::Tcp,
            repr.header_len() + payload_len,
            64,
        );

        emit(cx, (ip_repr, repr))
    }
}

fn initial_seq_number(cx: &mut InterfaceInner) -> TcpSeqNumber {
    let mix = cx.now().total_millis() as u32;
    TcpSeqNumber((mix ^ cx.rand().rand_u32()) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::IpAddress;

    const LOCAL: IpEndpoint = IpEndpoint {
        addr: IpAddress::v4(127, 0, 0, 1),
        port: 80,
    };
    const REMOTE: IpEndpoint = IpEndpoint {
        addr: IpAddress::v4(127, 0, 0, 1),
        port: 49152,
    };

    fn socket() -> Socket<'static> {
        let rx = vec![0u8; 256].leak();
        let tx = vec![0u8; 256].leak();
        Socket::new(RingBuffer::new(rx), RingBuffer::new(tx))
    }

    fn established(iss: i32, irs: i32) -> Socket<'static> {
        let mut s = socket();
        s.state = State::Established;
        s.local_endpoint = Some(LOCAL);
        s.remote_endpoint = Some(REMOTE);
        s.iss = TcpSeqNumber(iss);
        s.snd_una = TcpSeqNumber(iss + 1);
        s.snd_nxt = TcpSeqNumber(iss + 1);
        s.irs = TcpSeqNumber(irs);
        s.rcv_nxt = TcpSeqNumber(irs + 1);
        s
    }

    fn segment(control: TcpControl, seq: i32, ack: Option<i32>, payload: &[u8]) -> TcpRepr {
        TcpRepr {
            src_port: REMOTE.port,
            dst_port: LOCAL.port,
            control,
            seq_number: TcpSeqNumber(seq),
            ack_number: ack.map(TcpSeqNumber),
            window_len: 65535,
            max_seg_size: None,
            payload,
        }
    }

    fn ip_repr() -> IpRepr {
        IpRepr::new(REMOTE.addr, LOCAL.addr, IpProtocol::Tcp, 0, 64)
    }

    #[test]
    fn listen_rejects_port_zero() {
        let mut s = socket();
        assert_eq!(s.listen(0u16), Err(Error::Illegal));
    }

    #[test]
    fn listen_then_inbound_syn_is_queued_as_pending() {
        let mut s = socket();
        s.listen(80u16).unwrap();
        assert_eq!(s.state(), State::Listen);

        let syn = segment(TcpControl::Syn, 1000, None, &[]);
        s.process(Instant::from_millis(0), &ip_repr(), &syn);

        assert!(s.has_pending());
        let pending = s.accept().unwrap();
        assert_eq!(pending.remote, REMOTE);
        assert_eq!(pending.irs, TcpSeqNumber(1000));
    }

    #[test]
    fn listen_backlog_limits_pending_connections() {
        let mut s = socket();
        s.listen(80u16).unwrap();
        s.set_backlog(1);

        let syn = segment(TcpControl::Syn, 1000, None, &[]);
        s.process(Instant::from_millis(0), &ip_repr(), &syn);
        let syn2 = segment(TcpControl::Syn, 2000, None, &[]);
        s.process(Instant::from_millis(0), &ip_repr(), &syn2);

        assert!(s.has_pending());
        let pending = s.accept().unwrap();
        assert_eq!(pending.irs, TcpSeqNumber(1000), "the second SYN was dropped by the backlog limit");
        assert!(!s.has_pending());
    }

    #[test]
    fn syn_sent_receiving_synack_completes_the_handshake() {
        let mut s = socket();
        s.state = State::SynSent;
        s.local_endpoint = Some(LOCAL);
        s.remote_endpoint = Some(REMOTE);
        s.iss = TcpSeqNumber(500);
        s.snd_una = TcpSeqNumber(500);
        s.snd_nxt = TcpSeqNumber(501);

        let synack = segment(TcpControl::Syn, 9000, Some(501), &[]);
        s.process(Instant::from_millis(0), &ip_repr(), &synack);

        assert_eq!(s.state(), State::Established);
        assert_eq!(s.irs, TcpSeqNumber(9000));
        assert_eq!(s.rcv_nxt, TcpSeqNumber(9001));
        assert!(s.ack_pending);
    }

    #[test]
    fn established_socket_delivers_in_order_data() {
        let mut s = established(500, 9000);
        let data = segment(TcpControl::None, 9001, Some(501), b"hello");
        s.process(Instant::from_millis(0), &ip_repr(), &data);

        let mut buf = [0u8; 16];
        let n = s.recv_slice(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(s.rcv_nxt, TcpSeqNumber(9006));
    }

    #[test]
    fn out_of_order_segment_is_dropped_but_still_acked() {
        let mut s = established(500, 9000);
        // Peer's next expected byte is 9000+1=9001, but this segment starts later.
        let data = segment(TcpControl::None, 9010, Some(501), b"late");
        s.process(Instant::from_millis(0), &ip_repr(), &data);

        assert!(!s.can_recv(), "the out-of-order segment must not be buffered");
        assert!(s.ack_pending, "a duplicate ACK is still owed");
        assert_eq!(s.rcv_nxt, TcpSeqNumber(9001), "rcv_nxt does not advance");
    }

    #[test]
    fn established_receiving_fin_moves_to_close_wait() {
        let mut s = established(500, 9000);
        let fin = segment(TcpControl::Fin, 9001, Some(501), &[]);
        s.process(Instant::from_millis(0), &ip_repr(), &fin);

        assert_eq!(s.state(), State::CloseWait);
        assert_eq!(s.rcv_nxt, TcpSeqNumber(9002));
    }

    #[test]
    fn close_on_established_starts_active_close() {
        let mut s = established(500, 9000);
        s.close();
        assert_eq!(s.state(), State::FinWait1);
        assert!(s.close_requested);
    }

    #[test]
    fn fin_wait1_ack_of_fin_moves_to_fin_wait2() {
        let mut s = established(500, 9000);
        s.close();
        assert_eq!(s.state(), State::FinWait1);
        s.fin_seq = Some(s.snd_nxt);
        let fin_seq = s.fin_seq.unwrap();
        // The FIN occupies one sequence octet; simulate it having already
        // been dispatched (dispatch() would have advanced snd_nxt past it).
        s.snd_nxt = fin_seq + 1;

        let ack = TcpRepr {
            ack_number: Some(fin_seq + 1),
            ..segment(TcpControl::None, 9001, None, &[])
        };
        s.process(Instant::from_millis(0), &ip_repr(), &ack);

        assert_eq!(s.state(), State::FinWait2);
    }

    #[test]
    fn last_ack_ack_of_fin_closes_the_socket() {
        let mut s = established(500, 9000);
        s.state = State::LastAck;
        s.fin_seq = Some(s.snd_nxt);
        let fin_seq = s.fin_seq.unwrap();
        s.snd_nxt = fin_seq + 1;

        let ack = TcpRepr {
            ack_number: Some(fin_seq + 1),
            ..segment(TcpControl::None, 9001, None, &[])
        };
        s.process(Instant::from_millis(0), &ip_repr(), &ack);

        assert_eq!(s.state(), State::Closed);
    }

    #[test]
    fn rst_in_established_resets_the_connection() {
        let mut s = established(500, 9000);
        let rst = segment(TcpControl::Rst, 9001, Some(501), &[]);
        s.process(Instant::from_millis(0), &ip_repr(), &rst);

        assert_eq!(s.state(), State::Closed);
        assert_eq!(s.take_last_error(), Some(Error::ConnectionReset));
    }

    #[test]
    fn poll_timers_expires_time_wait_and_closes() {
        let mut s = established(500, 9000);
        let now = Instant::from_millis(0);
        s.enter_time_wait(now);
        assert_eq!(s.state(), State::TimeWait);

        assert!(!s.poll_timers(now));
        assert_eq!(s.state(), State::TimeWait);

        let expiry = now + Duration::from_secs(TCP_TIME_WAIT_SECS);
        assert!(s.poll_timers(expiry));
        assert_eq!(s.state(), State::Closed);
    }

    #[test]
    fn poll_timers_exhausts_syn_retries_and_resets() {
        let mut s = socket();
        s.state = State::SynSent;
        s.local_endpoint = Some(LOCAL);
        s.remote_endpoint = Some(REMOTE);
        s.last_send_at = Some(Instant::from_millis(0));

        let mut now = Instant::from_millis(0);
        for _ in 0..=TCP_MAX_RETRIES {
            now += s.rto * (s.retries as u32 + 1);
            let destroyed = s.poll_timers(now);
            if destroyed {
                break;
            }
            s.last_send_at = Some(now);
        }

        assert_eq!(s.state(), State::Closed);
        assert_eq!(s.take_last_error(), Some(Error::ConnectionReset));
    }
}
