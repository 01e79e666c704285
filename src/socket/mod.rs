//! Socket types exposed to applications, plus the API facade that ties them
//! to port allocation and the interface.

pub mod api;
pub mod tcp;
pub mod udp;

use crate::iface::socket_set::AnySocket;
use crate::iface::socket_meta::PollAt;
use crate::iface::InterfaceInner;

/// Any socket this stack knows how to poll.
#[derive(Debug)]
pub enum Socket<'a> {
    Udp(udp::Socket<'a>),
    Tcp(tcp::Socket<'a>),
}

impl<'a> Socket<'a> {
    pub(crate) fn poll_at(&self, cx: &mut InterfaceInner) -> PollAt {
        match self {
            Socket::Udp(s) => {
                if s.can_send() {
                    PollAt::Now
                } else {
                    PollAt::Ingress
                }
            }
            Socket::Tcp(s) => s.poll_at(cx.now()).map_or(PollAt::Ingress, |at| {
                if at <= cx.now() {
                    PollAt::Now
                } else {
                    PollAt::Time(at)
                }
            }),
        }
    }

    /// Advance retransmission/TIME-WAIT timers. A no-op for UDP, which has none.
    /// Returns `true` if the socket's state changed (e.g. TIME-WAIT expired).
    pub(crate) fn poll_timers(&mut self, cx: &mut InterfaceInner) -> bool {
        match self {
            Socket::Tcp(s) => s.poll_timers(cx.now()),
            Socket::Udp(_) => false,
        }
    }
}

impl<'a> From<udp::Socket<'a>> for Socket<'a> {
    fn from(socket: udp::Socket<'a>) -> Socket<'a> {
        Socket::Udp(socket)
    }
}

impl<'a> From<tcp::Socket<'a>> for Socket<'a> {
    fn from(socket: tcp::Socket<'a>) -> Socket<'a> {
        Socket::Tcp(socket)
    }
}

impl<'a> AnySocket<'a> for udp::Socket<'a> {
    fn downcast(socket: &Socket<'a>) -> Option<&Self> {
        match socket {
            Socket::Udp(s) => Some(s),
            _ => None,
        }
    }
    fn downcast_mut(socket: &mut Socket<'a>) -> Option<&mut Self> {
        match socket {
            Socket::Udp(s) => Some(s),
            _ => None,
        }
    }
}

impl<'a> AnySocket<'a> for tcp::Socket<'a> {
    fn downcast(socket: &Socket<'a>) -> Option<&Self> {
        match socket {
            Socket::Tcp(s) => Some(s),
            _ => None,
        }
    }
    fn downcast_mut(socket: &mut Socket<'a>) -> Option<&mut Self> {
        match socket {
            Socket::Tcp(s) => Some(s),
            _ => None,
        }
    }
}
