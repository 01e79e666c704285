use heapless::Vec;

use crate::config::IFACE_MAX_ROUTE_COUNT;
use crate::time::Instant;
use crate::wire::{IpAddress, IpCidr};
use crate::wire::{Ipv4Address, Ipv4Cidr};

const IPV4_DEFAULT: IpCidr = IpCidr::Ipv4(Ipv4Cidr::new(Ipv4Address::new(0, 0, 0, 0), 0));

/// A prefix of addresses that should be routed via a router
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub cidr: IpCidr,
    pub via_router: IpAddress,
    /// `None` means "forever".
    pub preferred_until: Option<Instant>,
    /// `None` means "forever".
    pub expires_at: Option<Instant>,
}

impl Route {
    pub fn new_ipv4_gateway(gateway: Ipv4Address) -> Route {
        Route {
            cidr: IPV4_DEFAULT,
            via_router: gateway.into(),
            preferred_until: None,
            expires_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTableFull;

impl core::fmt::Display for RouteTableFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Route table full")
    }
}

/// A routing table.
#[derive(Debug)]
pub struct Routes {
    storage: Vec<Route, IFACE_MAX_ROUTE_COUNT>,
}

impl Routes {
    /// Creates a new empty routing table.
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
        }
    }

    pub fn add_default_ipv4_route(
        &mut self,
        gateway: Ipv4Address,
    ) -> Result<Option<Route>, RouteTableFull> {
        let old = self.remove_default_ipv4_route();
        self.storage
            .push(Route::new_ipv4_gateway(gateway))
            .map_err(|_| RouteTableFull)?;
        Ok(old)
    }

    pub fn remove_default_ipv4_route(&mut self) -> Option<Route> {
        if let Some((i, _)) = self
            .storage
            .iter()
            .enumerate()
            .find(|(_, r)| r.cidr == IPV4_DEFAULT)
        {
            Some(self.storage.remove(i))
        } else {
            None
        }
    }

    /// Find the router to use to reach `addr`, if any route covers it and
    /// hasn't expired.
    pub fn lookup(&self, addr: &IpAddress, timestamp: Instant) -> Option<IpAddress> {
        self.storage
            .iter()
            .filter(|route| route.expires_at.map_or(true, |at| at >= timestamp))
            .find(|route| route.cidr.contains_addr(addr))
            .map(|route| route.via_router)
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gw(last: u8) -> Ipv4Address {
        Ipv4Address::new(192, 168, 1, last)
    }

    #[test]
    fn lookup_with_no_routes_finds_nothing() {
        let routes = Routes::new();
        let addr = IpAddress::v4(8, 8, 8, 8);
        assert_eq!(routes.lookup(&addr, Instant::from_millis(0)), None);
    }

    #[test]
    fn default_route_matches_any_address() {
        let mut routes = Routes::new();
        routes.add_default_ipv4_route(gw(1)).unwrap();
        let addr = IpAddress::v4(8, 8, 8, 8);
        assert_eq!(routes.lookup(&addr, Instant::from_millis(0)), Some(gw(1).into()));
    }

    #[test]
    fn adding_a_second_default_route_replaces_and_returns_the_first() {
        let mut routes = Routes::new();
        routes.add_default_ipv4_route(gw(1)).unwrap();
        let replaced = routes.add_default_ipv4_route(gw(2)).unwrap();
        assert_eq!(replaced.unwrap().via_router, IpAddress::from(gw(1)));
        let addr = IpAddress::v4(8, 8, 8, 8);
        assert_eq!(routes.lookup(&addr, Instant::from_millis(0)), Some(gw(2).into()));
    }

    #[test]
    fn remove_default_route_clears_the_lookup() {
        let mut routes = Routes::new();
        routes.add_default_ipv4_route(gw(1)).unwrap();
        assert!(routes.remove_default_ipv4_route().is_some());
        let addr = IpAddress::v4(8, 8, 8, 8);
        assert_eq!(routes.lookup(&addr, Instant::from_millis(0)), None);
    }

    #[test]
    fn expired_route_is_not_used() {
        let mut routes = Routes::new();
        routes.storage.push(Route {
            cidr: IPV4_DEFAULT,
            via_router: gw(1).into(),
            preferred_until: None,
            expires_at: Some(Instant::from_millis(100)),
        }).unwrap();
        let addr = IpAddress::v4(8, 8, 8, 8);
        assert_eq!(routes.lookup(&addr, Instant::from_millis(50)), Some(gw(1).into()));
        assert_eq!(routes.lookup(&addr, Instant::from_millis(200)), None);
    }

    #[test]
    fn route_table_full_is_reported_once_capacity_is_exhausted() {
        let mut routes = Routes::new();
        for i in 0..IFACE_MAX_ROUTE_COUNT {
            routes.storage.push(Route {
                cidr: IpCidr::Ipv4(Ipv4Cidr::new(Ipv4Address::new(10, 0, i as u8, 0), 24)),
                via_router: gw(1).into(),
                preferred_until: None,
                expires_at: None,
            }).unwrap();
        }
        assert_eq!(routes.add_default_ipv4_route(gw(2)), Err(RouteTableFull));
    }
}
