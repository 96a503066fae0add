// # Route Resolver Trait
//
// Defines the routing-table and interface lookups used once at startup to
// decide which interface joins the multicast group and which peer may send
// announcements.
//
// ## Implementations
//
// - rtnetlink (Linux): `sac-route-netlink` crate

use std::net::Ipv4Addr;

/// Result of a route query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Egress interface index
    pub ifindex: u32,
    /// Next hop, if the destination is not directly connected
    pub gateway: Option<Ipv4Addr>,
}

/// Trait for route resolvers
///
/// All methods are synchronous, side-effect free and idempotent.
pub trait RouteResolver {
    /// Look up the kernel's route to `destination`
    ///
    /// Fails if the kernel has no route or the reply carries no egress
    /// interface.
    fn route_to(&self, destination: Ipv4Addr) -> crate::Result<Route>;

    /// Look up an interface index by name
    fn interface_index(&self, name: &str) -> crate::Result<u32>;

    /// Look up an interface name by index
    fn interface_name(&self, ifindex: u32) -> crate::Result<String>;
}
