//! Error types for the source address client
//!
//! Two families live here:
//! - [`Error`]: fatal conditions (configuration, route resolution, socket
//!   setup, plugin loading). These abort startup or the receive loop.
//! - [`BackendFailure`]: the one failure a backend reports for itself. The
//!   dispatcher turns it into "disable this backend" and carries on.

use thiserror::Error;

/// Result type alias for fatal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type returned by backend lifecycle calls
pub type BackendResult<T> = std::result::Result<T, BackendFailure>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Route or interface resolution errors
    #[error("Route resolution error: {0}")]
    Route(String),

    /// Multicast socket setup errors
    #[error("Socket setup error: {0}")]
    Socket(String),

    /// Plugin loading errors (unknown class, bad settings)
    #[error("Plugin error ({plugin}): {message}")]
    Plugin {
        /// Plugin name from the configuration
        plugin: String,
        /// Error message
        message: String,
    },

    /// I/O errors (receive loop, config file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON conversion errors (backend settings)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a route resolution error
    pub fn route(msg: impl Into<String>) -> Self {
        Self::Route(msg.into())
    }

    /// Create a socket setup error
    pub fn socket(msg: impl Into<String>) -> Self {
        Self::Socket(msg.into())
    }

    /// Create a plugin loading error
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

/// A backend-reported failure
///
/// Returning this from `init`, `check` or `update` disables the backend for
/// the rest of the run. It is not an error of the process as a whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct BackendFailure {
    reason: String,
}

impl BackendFailure {
    /// Create a failure with a human-readable reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason given by the backend
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_error_names_plugin() {
        let err = Error::plugin("dns", "unknown class: nope");
        assert_eq!(err.to_string(), "Plugin error (dns): unknown class: nope");
    }

    #[test]
    fn test_backend_failure_displays_reason() {
        let failure = BackendFailure::new("external_media_address not found");
        assert_eq!(failure.reason(), "external_media_address not found");
        assert_eq!(failure.to_string(), "external_media_address not found");
    }
}
