// # Netlink Route Resolver
//
// This crate answers the startup route questions of the source address
// client with rtnetlink:
//
// - `RTM_GETROUTE` for a single IPv4 destination yields the egress
//   interface (`RTA_OIF`) and next hop (`RTA_GATEWAY`)
// - `if_nametoindex(3)` / `if_indextoname(3)` translate interface names
//
// All lookups are blocking and happen once, before the receive loop starts.
//
// ## Platform Support
//
// Netlink is Linux-specific. On other targets the resolver compiles but
// every lookup fails with a route error.

use sac_core::traits::{Route, RouteResolver};
use sac_core::Result;
use std::net::Ipv4Addr;

#[cfg(target_os = "linux")]
use sac_core::Error;

#[cfg(target_os = "linux")]
use tracing::debug;

#[cfg(target_os = "linux")]
use netlink_packet_core::{NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_REQUEST};

#[cfg(target_os = "linux")]
use netlink_packet_route::{constants::AF_INET, nlas::route::Nla, RouteMessage, RtnlMessage};

#[cfg(target_os = "linux")]
use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};

#[cfg(target_os = "linux")]
use std::ffi::{CStr, CString};

/// Route resolver backed by an rtnetlink socket
#[derive(Debug, Default, Clone, Copy)]
pub struct NetlinkRouteResolver;

impl NetlinkRouteResolver {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl RouteResolver for NetlinkRouteResolver {
    fn route_to(&self, destination: Ipv4Addr) -> Result<Route> {
        let socket = open_socket()?;
        socket
            .send(&route_request(destination), 0)
            .map_err(|e| Error::route(format!("Failed to send route query for {}: {}", destination, e)))?;

        let (reply, _) = socket
            .recv_from_full()
            .map_err(|e| Error::route(format!("Failed to read route reply for {}: {}", destination, e)))?;

        let route = parse_route_reply(destination, &reply)?;
        debug!(
            "Route to {}: ifindex {}, gateway {:?}",
            destination, route.ifindex, route.gateway
        );
        Ok(route)
    }

    fn interface_index(&self, name: &str) -> Result<u32> {
        let c_name = CString::new(name)
            .map_err(|_| Error::route(format!("Invalid interface name: {:?}", name)))?;

        // SAFETY: c_name is a valid NUL-terminated string for the duration of the call
        let ifindex = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if ifindex == 0 {
            return Err(Error::route(format!("No such interface: {}", name)));
        }
        Ok(ifindex)
    }

    fn interface_name(&self, ifindex: u32) -> Result<String> {
        let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];

        // SAFETY: buf holds IF_NAMESIZE bytes as if_indextoname(3) requires
        let ptr = unsafe { libc::if_indextoname(ifindex, buf.as_mut_ptr()) };
        if ptr.is_null() {
            return Err(Error::route(format!("No interface with index {}", ifindex)));
        }

        // SAFETY: on success the kernel wrote a NUL-terminated name into buf
        let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }
}

#[cfg(not(target_os = "linux"))]
impl RouteResolver for NetlinkRouteResolver {
    fn route_to(&self, _destination: Ipv4Addr) -> Result<Route> {
        Err(unsupported())
    }

    fn interface_index(&self, _name: &str) -> Result<u32> {
        Err(unsupported())
    }

    fn interface_name(&self, _ifindex: u32) -> Result<String> {
        Err(unsupported())
    }
}

#[cfg(not(target_os = "linux"))]
fn unsupported() -> sac_core::Error {
    sac_core::Error::route("Netlink route lookups are only supported on Linux")
}

#[cfg(target_os = "linux")]
fn open_socket() -> Result<Socket> {
    let mut socket = Socket::new(NETLINK_ROUTE)
        .map_err(|e| Error::route(format!("Failed to open netlink socket: {}", e)))?;
    socket
        .bind_auto()
        .map_err(|e| Error::route(format!("Failed to bind netlink socket: {}", e)))?;
    socket
        .connect(&SocketAddr::new(0, 0))
        .map_err(|e| Error::route(format!("Failed to connect netlink socket: {}", e)))?;
    Ok(socket)
}

/// Serialize an `RTM_GETROUTE` request for a single host route
#[cfg(target_os = "linux")]
fn route_request(destination: Ipv4Addr) -> Vec<u8> {
    let mut route = RouteMessage::default();
    route.header.address_family = AF_INET as u8;
    route.header.destination_prefix_length = 32;
    route.nlas.push(Nla::Destination(destination.octets().to_vec()));

    let mut header = NetlinkHeader::default();
    header.flags = NLM_F_REQUEST;
    header.sequence_number = 1;

    let mut message = NetlinkMessage::new(
        header,
        NetlinkPayload::InnerMessage(RtnlMessage::GetRoute(route)),
    );
    message.finalize();

    let mut buf = vec![0; message.buffer_len()];
    message.serialize(&mut buf[..]);
    buf
}

/// Extract egress interface and gateway from a kernel route reply
#[cfg(target_os = "linux")]
fn parse_route_reply(destination: Ipv4Addr, mut reply: &[u8]) -> Result<Route> {
    while !reply.is_empty() {
        let message = NetlinkMessage::<RtnlMessage>::deserialize(reply)
            .map_err(|e| Error::route(format!("Malformed route reply for {}: {}", destination, e)))?;
        let length = message.header.length as usize;

        match message.payload {
            NetlinkPayload::InnerMessage(RtnlMessage::NewRoute(route)) => {
                return route_from_message(destination, &route);
            }
            NetlinkPayload::Error(err) => {
                return Err(Error::route(format!(
                    "Kernel has no route to {}: {:?}",
                    destination, err
                )));
            }
            NetlinkPayload::Done(_) => break,
            _ => {}
        }

        if length == 0 || length > reply.len() {
            break;
        }
        reply = &reply[length..];
    }

    Err(Error::route(format!("Empty route reply for {}", destination)))
}

#[cfg(target_os = "linux")]
fn route_from_message(destination: Ipv4Addr, route: &RouteMessage) -> Result<Route> {
    let mut ifindex = None;
    let mut gateway = None;

    for nla in &route.nlas {
        match nla {
            Nla::Oif(index) => ifindex = Some(*index),
            Nla::Gateway(bytes) => {
                gateway = <[u8; 4]>::try_from(bytes.as_slice()).ok().map(Ipv4Addr::from)
            }
            _ => {}
        }
    }

    let ifindex = ifindex
        .ok_or_else(|| Error::route(format!("Route to {} has no egress interface", destination)))?;
    Ok(Route { ifindex, gateway })
}
