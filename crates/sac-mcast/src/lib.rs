// # Multicast Announcement Receiver
//
// Receives default source address announcements on a UDP multicast group.
//
// ## Socket Setup
//
// 1. Bind to `group:port`
// 2. Join the group on the interface chosen by the route decision
//    (`ip_mreqn` by index, so the interface needs no address of its own)
// 3. Unless insecure, connect to `announcer:source_port` so the kernel
//    drops datagrams from any other sender
//
// Every datagram is one announcement: exactly four bytes, the address in
// network byte order. Anything else is logged and skipped.

use sac_core::announcement::{self, RECV_BUFFER_LEN};
use sac_core::config::{ListenConfig, SacConfig};
use sac_core::route::{resolve_listen_route, SourceFilter};
use sac_core::traits::{AnnouncementSource, RouteResolver};
use sac_core::{Error, Result};

use socket2::{Domain, InterfaceIndexOrAddress, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Receiver for announcements on a multicast group
#[derive(Debug)]
pub struct MulticastReceiver {
    socket: UdpSocket,
    filter: SourceFilter,
}

impl MulticastReceiver {
    /// Decide the route, then bind and join
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &SacConfig, resolver: &dyn RouteResolver, insecure: bool) -> Result<Self> {
        let route = resolve_listen_route(resolver, &config.listen, &config.route, insecure)?;
        let filter = route.source_filter(insecure, config.route.source_port)?;
        let ifname = resolver.interface_name(route.ifindex)?;

        let receiver = Self::bind(&config.listen, route.ifindex, filter)?;
        info!(
            "Listening on {} for announcements from {} to {}:{}",
            ifname, filter, config.listen.address, config.listen.port
        );
        Ok(receiver)
    }

    /// Bind to the group, join it on `ifindex` and apply `filter`
    pub fn bind(listen: &ListenConfig, ifindex: u32, filter: SourceFilter) -> Result<Self> {
        let group = listen.address;
        let socket = new_socket(SocketAddrV4::new(group, listen.port))?;

        socket
            .join_multicast_v4_n(&group, &InterfaceIndexOrAddress::Index(ifindex))
            .map_err(|e| {
                Error::socket(format!(
                    "Failed to join {} on interface {}: {}",
                    group, ifindex, e
                ))
            })?;

        Self::from_socket(socket, filter)
    }

    fn from_socket(socket: Socket, filter: SourceFilter) -> Result<Self> {
        if let SourceFilter::Locked(peer) = filter {
            socket
                .connect(&SocketAddr::V4(peer).into())
                .map_err(|e| Error::socket(format!("Failed to lock source to {}: {}", peer, e)))?;
        }

        socket
            .set_nonblocking(true)
            .map_err(|e| Error::socket(format!("Failed to set non-blocking mode: {}", e)))?;

        let socket = UdpSocket::from_std(socket.into())
            .map_err(|e| Error::socket(format!("Failed to register socket: {}", e)))?;

        Ok(Self { socket, filter })
    }

    /// Which senders this receiver accepts
    pub fn filter(&self) -> SourceFilter {
        self.filter
    }

    /// Local address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

fn new_socket(addr: SocketAddrV4) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| Error::socket(format!("Failed to create UDP socket: {}", e)))?;
    socket
        .bind(&SocketAddr::V4(addr).into())
        .map_err(|e| Error::socket(format!("Failed to bind {}: {}", addr, e)))?;
    Ok(socket)
}

#[async_trait::async_trait]
impl AnnouncementSource for MulticastReceiver {
    async fn recv(&mut self) -> Result<Option<Ipv4Addr>> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        debug!("Received {} bytes from {}", len, from);

        let address = announcement::decode(&buf[..len]);
        if address.is_none() {
            debug!("Ignoring message due to incorrect length");
        }
        Ok(address)
    }
}
