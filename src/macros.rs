//! Macros shared across `wire` and `iface`. Kept ahead of `phy` in `lib.rs`
//! since later modules rely on `enum_with_unknown!` at parse time.

/// Define an enum that roundtrips an unrecognized wire value into an
/// `Unknown` variant instead of failing to parse. Used for every "small
/// space of valid values, large space of possible values" field (EtherType,
/// ARP operation, IP protocol number, ...).
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $( $( #[$variant_attr:meta] )* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $( #[$enum_attr] )*
        pub enum $name {
            $( $( #[$variant_attr] )* $variant ),+,
            Unknown($ty),
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),+,
                    other => $name::Unknown(other),
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),+,
                    $name::Unknown(other) => other,
                }
            }
        }
    }
}

/// Trace-level logging for routine per-packet drops and state changes.
/// A no-op if the `log` crate has no sink installed.
macro_rules! net_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) }
}

/// Debug-level logging for malformed input and dropped packets: these are
/// silently dropped with a counter increment, the counter increment is the
/// side effect and this is the audit trail.
macro_rules! net_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) }
}

pub(crate) use enum_with_unknown;
pub(crate) use net_debug;
pub(crate) use net_trace;
