// # Announcement Source Trait
//
// Defines the interface the engine reads announcements from.
//
// ## Implementations
//
// - Multicast UDP: `sac-mcast` crate
// - Scripted doubles in the contract tests

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for announcement sources
///
/// # Behavior
///
/// - `recv` waits until one datagram arrives
/// - A well-formed announcement yields `Ok(Some(address))`
/// - A malformed one (wrong length) yields `Ok(None)`; the caller simply
///   calls `recv` again
/// - An I/O failure yields `Err`, which is fatal for the receive loop
///
/// `recv` must be cancellation-safe: the engine drops a pending `recv` when
/// it shuts down.
#[async_trait]
pub trait AnnouncementSource: Send {
    /// Wait for the next announcement
    async fn recv(&mut self) -> crate::Result<Option<Ipv4Addr>>;
}
