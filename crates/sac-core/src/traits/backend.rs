// # Backend Trait
//
// Defines the interface every dependent-service backend implements.
//
// ## Implementations
//
// - Asterisk PJSIP: `sac-backend-pjsip` crate (`class = "ast_pjsip"`)
// - Hurricane Electric DNS: `sac-backend-hedns` crate (`class = "he_dns"`)
//
// ## Usage
//
// ```rust,ignore
// use sac_core::Backend;
//
// let mut backend = /* Backend implementation */;
// backend.init().await?;
//
// let address = "203.0.113.5".parse()?;
// if !backend.check(address).await? {
//     backend.update(address).await?;
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

use crate::config::PluginConfig;
use crate::error::BackendResult;

/// Trait for backend implementations
///
/// The lifecycle is `init` once, then any number of `check`/`update` pairs,
/// then `cleanup` once at shutdown.
///
/// # Failure contract
///
/// Expected failures (unreachable service, unexpected file contents, rejected
/// credentials) are reported as [`BackendFailure`](crate::BackendFailure).
/// The plugin registry logs the reason and disables the backend for the rest
/// of the run; other backends are unaffected.
///
/// Anything else is a bug in the backend and is allowed to panic.
///
/// # Restrictions
///
/// - No retries or background tasks: one call, one attempt
/// - No knowledge of other backends
/// - No decisions about *when* to update; that is the engine's job
#[async_trait]
pub trait Backend: Send + Sync {
    /// One-time initialization, called before the first announcement
    async fn init(&mut self) -> BackendResult<()> {
        Ok(())
    }

    /// Whether the service already uses `address`
    ///
    /// Returning `Ok(true)` skips the `update` call for this cycle.
    async fn check(&self, address: Ipv4Addr) -> BackendResult<bool>;

    /// Make the service use `address`
    async fn update(&self, address: Ipv4Addr) -> BackendResult<()>;

    /// Release resources at shutdown
    async fn cleanup(&mut self) {}
}

/// Helper trait for constructing backends from configuration
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance
    ///
    /// # Parameters
    ///
    /// - `name`: The plugin name (the `[plugin.<name>]` key)
    /// - `config`: The plugin table; use [`PluginConfig::settings_as`] to
    ///   get typed settings
    ///
    /// # Returns
    ///
    /// A boxed Backend trait object, or a fatal error for invalid settings
    fn create(&self, name: &str, config: &PluginConfig) -> crate::Result<Box<dyn Backend>>;
}
