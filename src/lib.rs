//! A small network stack for a hobbyist operating system: link framing,
//! ARP, IPv4, and a from-scratch TCP/UDP implementation, topped with a
//! POSIX-flavored socket API.
//!
//! Layering mirrors the data flow. Outbound: [`socket::api::SocketApi`] ->
//! [`socket::tcp`]/[`socket::udp`] -> [`iface`] (routing + ARP) -> [`phy`]
//! (link driver). Inbound is the same chain in reverse, driven by
//! [`iface::Interface::poll`].

#[macro_use]
mod macros;

pub mod config;
pub mod rand;
pub mod storage;
pub mod time;
pub mod wire;

pub mod phy;

pub mod iface;
pub mod socket;

pub use iface::{Config, Interface};
pub use socket::api::SocketApi;
