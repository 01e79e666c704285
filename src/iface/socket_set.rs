//! A slab of sockets the interface polls each round, indexed by opaque
//! handles so callers can hold on to a socket across polls without
//! borrowing the set itself.

use core::fmt;

use super::socket_meta::Meta;
use crate::socket::Socket;

/// An opaque handle identifying a socket previously added to a [`SocketSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle(usize);

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub(crate) struct Item<'a> {
    pub(crate) meta: Meta,
    pub(crate) socket: Socket<'a>,
}

/// A handle-indexed collection of sockets, polled together by [`super::Interface`].
#[derive(Default)]
pub struct SocketSet<'a> {
    sockets: Vec<Option<Item<'a>>>,
}

impl<'a> SocketSet<'a> {
    pub fn new() -> SocketSet<'a> {
        SocketSet {
            sockets: Vec::new(),
        }
    }

    /// Add a socket to the set, returning a handle that can later retrieve it.
    pub fn add<T: Into<Socket<'a>>>(&mut self, socket: T) -> SocketHandle {
        let item = Item {
            meta: Meta::default(),
            socket: socket.into(),
        };
        for (index, slot) in self.sockets.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(item);
                return SocketHandle(index);
            }
        }
        self.sockets.push(Some(item));
        SocketHandle(self.sockets.len() - 1)
    }

    /// Remove a socket, returning it to the caller. Panics if the handle is stale.
    pub fn remove(&mut self, handle: SocketHandle) -> Socket<'a> {
        self.sockets[handle.0]
            .take()
            .expect("handle does not refer to a live socket")
            .socket
    }

    pub fn get<T: AnySocket<'a>>(&self, handle: SocketHandle) -> &T {
        match self.sockets[handle.0].as_ref() {
            Some(item) => T::downcast(&item.socket).expect("wrong socket type for handle"),
            None => panic!("handle does not refer to a live socket"),
        }
    }

    pub fn get_mut<T: AnySocket<'a>>(&mut self, handle: SocketHandle) -> &mut T {
        match self.sockets[handle.0].as_mut() {
            Some(item) => T::downcast_mut(&mut item.socket).expect("wrong socket type for handle"),
            None => panic!("handle does not refer to a live socket"),
        }
    }

    pub(crate) fn items(&self) -> impl Iterator<Item = &Item<'a>> {
        self.sockets.iter().filter_map(|slot| slot.as_ref())
    }

    pub(crate) fn items_mut(&mut self) -> impl Iterator<Item = &mut Item<'a>> {
        self.sockets.iter_mut().filter_map(|slot| slot.as_mut())
    }
}

/// Implemented by every concrete socket type so [`SocketSet::get`] can
/// downcast from the [`Socket`] enum back to the caller's expected type.
pub trait AnySocket<'a> {
    fn downcast(socket: &Socket<'a>) -> Option<&Self>;
    fn downcast_mut(socket: &mut Socket<'a>) -> Option<&mut Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::udp;
    use crate::storage::PacketMetadata;

    fn udp_socket() -> udp::Socket<'static> {
        let rx_meta = vec![PacketMetadata::EMPTY; 4].leak();
        let rx_payload = vec![0u8; 64].leak();
        let tx_meta = vec![PacketMetadata::EMPTY; 4].leak();
        let tx_payload = vec![0u8; 64].leak();
        udp::Socket::new(
            udp::PacketBuffer::new(rx_meta, rx_payload),
            udp::PacketBuffer::new(tx_meta, tx_payload),
        )
    }

    #[test]
    fn add_then_get_returns_the_same_socket() {
        let mut set = SocketSet::new();
        let handle = set.add(udp_socket());
        let socket: &udp::Socket = set.get(handle);
        assert!(!socket.is_open());
    }

    #[test]
    fn remove_frees_the_slot_for_reuse() {
        let mut set = SocketSet::new();
        let first = set.add(udp_socket());
        set.remove(first);
        let second = set.add(udp_socket());
        assert_eq!(first, second, "the freed slot should be reused rather than growing the set");
    }

    #[test]
    #[should_panic]
    fn get_after_remove_panics() {
        let mut set = SocketSet::new();
        let handle = set.add(udp_socket());
        set.remove(handle);
        let _: &udp::Socket = set.get(handle);
    }

    #[test]
    fn items_mut_sees_every_live_socket() {
        let mut set = SocketSet::new();
        set.add(udp_socket());
        set.add(udp_socket());
        assert_eq!(set.items_mut().count(), 2);
    }
}
