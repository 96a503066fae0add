//! Configured backend instances and dispatch
//!
//! The [`PluginRegistry`] owns every configured backend together with its
//! enabled/disabled flag.
//!
//! ## Plugin state machine
//!
//! ```text
//! Enabled ──(BackendFailure from init/check/update)──▶ Disabled
//! ```
//!
//! Disabled is terminal for the run. Nothing re-enables a plugin.
//!
//! ## Dispatch
//!
//! For each plugin, in registration order:
//!
//! 1. Disabled → skip
//! 2. `check(address)` is true → already current, no `update`
//! 3. Otherwise `update(address)`
//! 4. A `BackendFailure` from either call disables the plugin; dispatch
//!    continues with the next one

mod dispatch;

pub use dispatch::{DispatchOutcome, DispatchReport};

use tracing::{error, info, warn};

use crate::config::{PluginsConfig, SacConfig};
use crate::error::{BackendFailure, Error, Result};
use crate::registry::BackendRegistry;
use crate::traits::Backend;

/// One configured backend
pub struct Plugin {
    name: String,
    class: String,
    disabled: bool,
    backend: Box<dyn Backend>,
}

impl Plugin {
    /// Wrap a backend instance; plugins start enabled
    pub fn new(name: impl Into<String>, class: impl Into<String>, backend: Box<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            disabled: false,
            backend,
        }
    }

    /// Plugin name (the `[plugin.<name>]` key)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend class
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Whether the plugin has been disabled
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Log a backend failure and disable the plugin
    fn disable(&mut self, failure: &BackendFailure) {
        error!("{}: {}", self.name, failure);
        warn!("Disabling plugin: {}", self.name);
        self.disabled = true;
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

/// Registry of configured plugins
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct every configured plugin
    ///
    /// Plugins are created in document order. Any failure (unknown class,
    /// class not on the allow-list, invalid settings) is fatal.
    /// Zero configured plugins is allowed but logged as a warning.
    pub fn load(registry: &BackendRegistry, config: &SacConfig) -> Result<Self> {
        let mut plugins = Self::new();

        for entry in &config.plugin {
            Self::check_allowed(&config.plugins, &entry.name, entry.config.class())?;

            let backend = registry.create_backend(&entry.name, &entry.config)?;
            let class = entry.config.class().unwrap_or_default();
            plugins.push(Plugin::new(entry.name.clone(), class, backend))?;
            info!("Loaded plugin: {}", entry.name);
        }

        if plugins.is_empty() {
            warn!("No plugins configured; won't do anything");
        }

        Ok(plugins)
    }

    fn check_allowed(allow: &PluginsConfig, name: &str, class: Option<&str>) -> Result<()> {
        match class {
            Some(class) if !allow.allows(class) => Err(Error::plugin(
                name,
                format!("Plugin class not allowed by plugins.modules: {}", class),
            )),
            _ => Ok(()),
        }
    }

    /// Append a plugin; names must be unique
    pub fn push(&mut self, plugin: Plugin) -> Result<()> {
        if self.get(plugin.name()).is_some() {
            return Err(Error::plugin(plugin.name(), "Duplicate plugin name"));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Run every plugin's `init` hook
    ///
    /// A failing plugin is disabled; the rest still initialize.
    pub async fn init_all(&mut self) {
        for plugin in &mut self.plugins {
            if let Err(failure) = plugin.backend.init().await {
                plugin.disable(&failure);
            }
        }
    }

    /// Run every plugin's `cleanup` hook, disabled ones included
    pub async fn cleanup_all(&mut self) {
        for plugin in &mut self.plugins {
            plugin.backend.cleanup().await;
        }
    }

    /// Look up a plugin by name
    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Iterate plugins in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    /// Number of configured plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugins are configured
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Number of plugins still enabled
    pub fn enabled_count(&self) -> usize {
        self.plugins.iter().filter(|p| !p.disabled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PluginConfig, PluginEntry};
    use crate::error::BackendResult;
    use crate::traits::BackendFactory;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        fail_init: bool,
        cleanups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Backend for Probe {
        async fn init(&mut self) -> BackendResult<()> {
            if self.fail_init {
                return Err(BackendFailure::new("Failed to resolve any nameservers"));
            }
            Ok(())
        }

        async fn check(&self, _address: Ipv4Addr) -> BackendResult<bool> {
            Ok(false)
        }

        async fn update(&self, _address: Ipv4Addr) -> BackendResult<()> {
            Ok(())
        }

        async fn cleanup(&mut self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ProbeFactory {
        cleanups: Arc<AtomicUsize>,
    }

    impl BackendFactory for ProbeFactory {
        fn create(&self, _name: &str, config: &PluginConfig) -> Result<Box<dyn Backend>> {
            let fail_init = config
                .settings
                .get("fail_init")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Ok(Box::new(Probe {
                fail_init,
                cleanups: Arc::clone(&self.cleanups),
            }))
        }
    }

    fn registry(cleanups: &Arc<AtomicUsize>) -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register_backend(
            "probe",
            Box::new(ProbeFactory {
                cleanups: Arc::clone(cleanups),
            }),
        );
        registry
    }

    fn config_with(entries: Vec<PluginEntry>) -> SacConfig {
        SacConfig {
            plugin: entries,
            ..SacConfig::default()
        }
    }

    #[test]
    fn test_load_keeps_order() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let config = config_with(vec![
            PluginEntry::new("b", PluginConfig::new("probe")),
            PluginEntry::new("a", PluginConfig::new("probe")),
        ]);

        let plugins = PluginRegistry::load(&registry(&cleanups), &config).unwrap();

        let names: Vec<&str> = plugins.iter().map(Plugin::name).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(plugins.enabled_count(), 2);
    }

    #[test]
    fn test_load_empty_is_allowed() {
        let cleanups = Arc::new(AtomicUsize::new(0));

        let plugins = PluginRegistry::load(&registry(&cleanups), &SacConfig::default()).unwrap();

        assert!(plugins.is_empty());
    }

    #[test]
    fn test_load_unknown_class_is_fatal() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let config = config_with(vec![PluginEntry::new("x", PluginConfig::new("nope"))]);

        assert!(PluginRegistry::load(&registry(&cleanups), &config).is_err());
    }

    #[test]
    fn test_load_respects_allow_list() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let mut config = config_with(vec![PluginEntry::new("x", PluginConfig::new("probe"))]);
        config.plugins.modules = vec!["he_dns".to_string()];

        let err = PluginRegistry::load(&registry(&cleanups), &config).unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut plugins = PluginRegistry::new();
        let cleanups = Arc::new(AtomicUsize::new(0));
        let make = || {
            Box::new(Probe {
                fail_init: false,
                cleanups: Arc::clone(&cleanups),
            })
        };

        plugins.push(Plugin::new("dns", "probe", make())).unwrap();
        assert!(plugins.push(Plugin::new("dns", "probe", make())).is_err());
        assert_eq!(plugins.len(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_disables_only_that_plugin() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let config = config_with(vec![
            PluginEntry::new("bad", PluginConfig::new("probe").with_setting("fail_init", true)),
            PluginEntry::new("good", PluginConfig::new("probe")),
        ]);
        let mut plugins = PluginRegistry::load(&registry(&cleanups), &config).unwrap();

        plugins.init_all().await;

        assert!(plugins.get("bad").unwrap().is_disabled());
        assert!(!plugins.get("good").unwrap().is_disabled());
        assert_eq!(plugins.enabled_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_reaches_disabled_plugins() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let config = config_with(vec![
            PluginEntry::new("bad", PluginConfig::new("probe").with_setting("fail_init", true)),
            PluginEntry::new("good", PluginConfig::new("probe")),
        ]);
        let mut plugins = PluginRegistry::load(&registry(&cleanups), &config).unwrap();
        plugins.init_all().await;

        plugins.cleanup_all().await;

        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }
}
