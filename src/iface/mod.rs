mod interface;
mod neighbor;
mod packet;
mod route;
pub(crate) mod socket_meta;
pub(crate) mod socket_set;

pub use self::interface::{Config, Interface, InterfaceInner, PollResult};
pub use self::route::{Route, Routes};
pub use self::socket_set::{SocketHandle, SocketSet};
