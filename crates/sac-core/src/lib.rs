// # sac-core
//
// Core library for the source address client (SAC).
//
// An external route monitor multicasts the host's default source address
// whenever it changes. This crate turns those announcements into updates of
// dependent services:
//
// - **RouteResolver**: Trait for the one-time route/interface lookup used to
//   decide where to listen and whom to trust
// - **AnnouncementSource**: Trait for the receiver that yields announcements
// - **Backend**: Trait every dependent-service backend implements
// - **BackendRegistry**: Compile-time factory table, keyed by class name
// - **PluginRegistry**: Configured backend instances plus their enabled flag;
//   dispatches a new address with per-backend failure isolation
// - **SacEngine**: The receive → filter → dispatch loop
//
// ## Design Principles
//
// 1. **Core-first**: everything but platform I/O and backend business logic
//    lives here and is testable with doubles
// 2. **Static registration**: backends are compiled in and selected by class
//    name; there is no dynamic code loading
// 3. **Failure isolation**: a failing backend is disabled, never fatal
// 4. **Single thread of control**: one loop, sequential dispatch

pub mod announcement;
pub mod config;
pub mod engine;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod route;
pub mod traits;

// Re-export core types for convenience
pub use announcement::NO_DEFAULT_ROUTE;
pub use config::{ListenConfig, PluginConfig, PluginEntry, PluginsConfig, RouteConfig, SacConfig};
pub use engine::{EngineEvent, SacEngine, StopReason, Transition};
pub use error::{BackendFailure, BackendResult, Error, Result};
pub use plugin::{DispatchOutcome, DispatchReport, Plugin, PluginRegistry};
pub use registry::BackendRegistry;
pub use route::{ListenRoute, SourceFilter};
pub use traits::{AnnouncementSource, Backend, BackendFactory, Route, RouteResolver};
