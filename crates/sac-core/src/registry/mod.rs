//! Compile-time backend registry
//!
//! The registry maps backend class names to factories. Backend crates
//! register themselves at startup; configuration then selects a class per
//! plugin by name. There is no dynamic code loading.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sac_core::BackendRegistry;
//!
//! let mut registry = BackendRegistry::new();
//! sac_backend_pjsip::register(&mut registry);
//! sac_backend_hedns::register(&mut registry);
//!
//! let backend = registry.create_backend("asterisk", &plugin_config)?;
//! ```
//!
//! ## Registration
//!
//! Implementations provide a `register` function:
//!
//! ```rust,ignore
//! // In sac-backend-pjsip
//! pub fn register(registry: &mut BackendRegistry) {
//!     registry.register_backend("ast_pjsip", Box::new(PjsipFactory));
//! }
//! ```

use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::traits::{Backend, BackendFactory};
use std::collections::HashMap;

/// Backend registry for configuration-driven backend creation
#[derive(Default)]
pub struct BackendRegistry {
    /// Registered backend factories, keyed by class name
    backends: HashMap<String, Box<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend factory
    ///
    /// Registering the same class twice replaces the earlier factory.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use sac_core::registry::BackendRegistry;
    /// # use sac_core::traits::{Backend, BackendFactory};
    /// # use sac_core::config::PluginConfig;
    /// # struct MyFactory;
    /// # impl BackendFactory for MyFactory {
    /// #     fn create(&self, _name: &str, _config: &PluginConfig) -> sac_core::Result<Box<dyn Backend>> { unimplemented!() }
    /// # }
    /// let mut registry = BackendRegistry::new();
    /// registry.register_backend("my_backend", Box::new(MyFactory));
    /// ```
    pub fn register_backend(&mut self, class: impl Into<String>, factory: Box<dyn BackendFactory>) {
        self.backends.insert(class.into(), factory);
    }

    /// Create a backend for plugin `name`
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Backend>)`: Created backend instance
    /// - `Err(Error)`: No class configured, unknown class, or the factory
    ///   rejected the settings
    pub fn create_backend(&self, name: &str, config: &PluginConfig) -> Result<Box<dyn Backend>> {
        let class = config
            .class()
            .ok_or_else(|| Error::plugin(name, "Plugin class not specified"))?;

        let factory = self
            .backends
            .get(class)
            .ok_or_else(|| Error::plugin(name, format!("Plugin class not found: {}", class)))?;

        factory.create(name, config)
    }

    /// List all registered backend classes, sorted
    pub fn list_backends(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.backends.keys().cloned().collect();
        classes.sort();
        classes
    }

    /// Check if a backend class is registered
    pub fn has_backend(&self, class: &str) -> bool {
        self.backends.contains_key(class)
    }
}
