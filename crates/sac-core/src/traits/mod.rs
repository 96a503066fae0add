//! Core traits for the source address client
//!
//! This module defines the abstract interfaces that implementations follow.
//!
//! - [`Backend`]: A dependent service that must track the source address
//! - [`AnnouncementSource`]: Yields announced source addresses
//! - [`RouteResolver`]: One-time routing table and interface lookups

pub mod announcement_source;
pub mod backend;
pub mod route_resolver;

pub use announcement_source::AnnouncementSource;
pub use backend::{Backend, BackendFactory};
pub use route_resolver::{Route, RouteResolver};
