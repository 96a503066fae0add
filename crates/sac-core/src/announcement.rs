//! Announcement wire format
//!
//! An announcement is a UDP datagram whose payload is exactly four bytes: the
//! new default source IPv4 address in network byte order. Any other length is
//! discarded.

use std::net::Ipv4Addr;

/// Address sent by the route monitor when the host has no default route
pub const NO_DEFAULT_ROUTE: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Size of the receive buffer; anything longer is malformed anyway
pub const RECV_BUFFER_LEN: usize = 256;

/// Length of a well-formed announcement payload
pub const ANNOUNCEMENT_LEN: usize = 4;

/// Decode an announcement payload
///
/// Returns `None` unless the payload is exactly [`ANNOUNCEMENT_LEN`] bytes.
pub fn decode(payload: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; ANNOUNCEMENT_LEN] = payload.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}
