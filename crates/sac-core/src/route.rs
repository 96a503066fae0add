//! Listener route decision
//!
//! Decides, once at startup, which interface joins the multicast group and
//! which peer is trusted to send announcements.
//!
//! | `route.gateway` | `listen.interface` | interface from | announcer |
//! |---|---|---|---|
//! | set | set | name lookup | configured gateway |
//! | set | unset | route to gateway | configured gateway |
//! | unset | set | name lookup | gateway of route to `route.destination` |
//! | unset | unset | route to `route.destination` | gateway of that route |

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use tracing::debug;

use crate::config::{ListenConfig, RouteConfig};
use crate::error::{Error, Result};
use crate::traits::RouteResolver;

/// Which datagrams the receiver accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    /// Any sender (insecure mode)
    Any,
    /// Only this sender; enforced by the kernel via a connected socket
    Locked(SocketAddrV4),
}

impl fmt::Display for SourceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFilter::Any => f.write_str("ANY SOURCE"),
            SourceFilter::Locked(peer) => write!(f, "{}", peer),
        }
    }
}

/// Outcome of the startup route decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenRoute {
    /// Interface that joins the multicast group
    pub ifindex: u32,
    /// Expected announcer address
    pub gateway: Option<Ipv4Addr>,
}

impl ListenRoute {
    /// Build the source filter for this route
    ///
    /// In secure mode the gateway is mandatory.
    pub fn source_filter(&self, insecure: bool, source_port: u16) -> Result<SourceFilter> {
        if insecure {
            return Ok(SourceFilter::Any);
        }

        let gateway = self
            .gateway
            .ok_or_else(|| Error::route("No announcer address known; cannot lock source"))?;
        Ok(SourceFilter::Locked(SocketAddrV4::new(gateway, source_port)))
    }
}

/// Decide the listener interface and expected announcer
///
/// # Errors
///
/// - The kernel has no route to the probe destination or gateway
/// - A configured interface name does not exist
/// - No gateway is configured, none can be detected, and `insecure` is false
pub fn resolve_listen_route(
    resolver: &dyn RouteResolver,
    listen: &ListenConfig,
    route: &RouteConfig,
    insecure: bool,
) -> Result<ListenRoute> {
    let configured_ifindex = match listen.interface {
        Some(ref name) => Some(resolver.interface_index(name)?),
        None => None,
    };

    if let Some(gateway) = route.gateway {
        let ifindex = match configured_ifindex {
            Some(ifindex) => ifindex,
            None => resolver.route_to(gateway)?.ifindex,
        };
        debug!("Using configured gateway {} on interface index {}", gateway, ifindex);
        return Ok(ListenRoute {
            ifindex,
            gateway: Some(gateway),
        });
    }

    let default_route = resolver.route_to(route.destination)?;
    if default_route.gateway.is_none() && !insecure {
        return Err(Error::route(format!(
            "Failed to get default gateway for {}",
            route.destination
        )));
    }

    let ifindex = configured_ifindex.unwrap_or(default_route.ifindex);
    debug!(
        "Default route to {}: interface index {}, gateway {:?}",
        route.destination, default_route.ifindex, default_route.gateway
    );

    Ok(ListenRoute {
        ifindex,
        gateway: default_route.gateway,
    })
}
