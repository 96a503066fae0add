//! Configuration types for the source address client
//!
//! The configuration file is TOML:
//!
//! ```toml
//! [listen]
//! address = "239.255.42.42"
//! port = 4242
//! # interface = "eth0"
//!
//! [route]
//! destination = "8.8.8.8"
//! # gateway = "192.0.2.1"
//! source_port = 42
//!
//! [plugins]
//! modules = ["ast_pjsip", "he_dns"]
//!
//! [plugin.asterisk]
//! class = "ast_pjsip"
//!
//! [plugin.dns]
//! class = "he_dns"
//! hostname = "sip.example.com"
//! password = "secret"
//! username = "example"
//! nameservers = ["ns1.he.net", "ns2.he.net"]
//! ```
//!
//! `[plugin.*]` tables keep their document order; that is the order in which
//! backends are initialized and dispatched.

use serde::de::{self, DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SacConfig {
    /// Where announcements are received
    #[serde(default)]
    pub listen: ListenConfig,

    /// How the announcer is located
    #[serde(default)]
    pub route: RouteConfig,

    /// Backend allow-list
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Configured backends, in document order
    #[serde(
        default,
        rename = "plugin",
        serialize_with = "serialize_plugins",
        deserialize_with = "deserialize_plugins"
    )]
    pub plugin: Vec<PluginEntry>,
}

impl SacConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.listen.address.is_multicast() {
            return Err(Error::config(format!(
                "listen.address is not a multicast address: {}",
                self.listen.address
            )));
        }

        if let Some(ref interface) = self.listen.interface
            && interface.is_empty()
        {
            return Err(Error::config("listen.interface cannot be empty"));
        }

        self.plugins.validate()?;

        for entry in &self.plugin {
            if entry.config.class().is_none_or(str::is_empty) {
                return Err(Error::config(format!(
                    "Plugin class not specified: {}",
                    entry.name
                )));
            }
        }

        Ok(())
    }
}

/// Multicast listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Multicast group to join
    #[serde(default = "default_listen_address")]
    pub address: Ipv4Addr,

    /// UDP port to bind
    #[serde(default = "default_listen_port")]
    pub port: u16,

    /// Interface to join on; overrides route-based detection
    #[serde(default)]
    pub interface: Option<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            port: default_listen_port(),
            interface: None,
        }
    }
}

fn default_listen_address() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 42, 42)
}

fn default_listen_port() -> u16 {
    4242
}

/// Announcer location configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Probe destination used to find the default route when no gateway is set
    #[serde(default = "default_route_destination")]
    pub destination: Ipv4Addr,

    /// Expected announcer address (normally the default gateway)
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,

    /// Expected announcer source port
    #[serde(default = "default_source_port")]
    pub source_port: u16,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            destination: default_route_destination(),
            gateway: None,
            source_port: default_source_port(),
        }
    }
}

fn default_route_destination() -> Ipv4Addr {
    Ipv4Addr::new(8, 8, 8, 8)
}

fn default_source_port() -> u16 {
    42
}

/// Backend allow-list configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Compiled-in backend classes that may be instantiated.
    ///
    /// Empty allows every registered class.
    #[serde(default)]
    pub modules: Vec<String>,

    /// File-based backend sources. Not supported; must be empty.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl PluginsConfig {
    /// Validate the allow-list
    pub fn validate(&self) -> Result<()> {
        if let Some(file) = self.files.first() {
            return Err(Error::config(format!(
                "Loading backends from files is not supported: {}",
                file.display()
            )));
        }

        if self.modules.iter().any(String::is_empty) {
            return Err(Error::config("plugins.modules cannot contain empty names"));
        }

        Ok(())
    }

    /// Whether a backend class may be instantiated
    pub fn allows(&self, class: &str) -> bool {
        self.modules.is_empty() || self.modules.iter().any(|m| m == class)
    }
}

/// One `[plugin.<name>]` table
#[derive(Debug, Clone, PartialEq)]
pub struct PluginEntry {
    /// Unique plugin name (the table key)
    pub name: String,

    /// Plugin settings
    pub config: PluginConfig,
}

impl PluginEntry {
    /// Create a plugin entry
    pub fn new(name: impl Into<String>, config: PluginConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// Backend class selector plus backend-specific settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Backend class name (e.g., "ast_pjsip", "he_dns")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Everything else in the table
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl PluginConfig {
    /// Create a plugin config for a class with no settings
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            settings: serde_json::Map::new(),
        }
    }

    /// Add a setting
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// The configured class, if any
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    /// Deserialize the backend-specific settings into a typed struct
    pub fn settings_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(serde_json::Value::Object(self.settings.clone()))
    }
}

struct PluginTableVisitor;

impl<'de> Visitor<'de> for PluginTableVisitor {
    type Value = Vec<PluginEntry>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a table of plugin tables")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
        let mut entries: Vec<PluginEntry> = Vec::new();
        while let Some((name, config)) = map.next_entry::<String, PluginConfig>()? {
            if entries.iter().any(|e| e.name == name) {
                return Err(de::Error::custom(format!("duplicate plugin: {}", name)));
            }
            entries.push(PluginEntry { name, config });
        }
        Ok(entries)
    }
}

fn deserialize_plugins<'de, D>(deserializer: D) -> std::result::Result<Vec<PluginEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(PluginTableVisitor)
}

fn serialize_plugins<S>(entries: &[PluginEntry], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(entries.iter().map(|e| (&e.name, &e.config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SacConfig::from_toml_str("").unwrap();

        assert_eq!(config.listen.address, Ipv4Addr::new(239, 255, 42, 42));
        assert_eq!(config.listen.port, 4242);
        assert_eq!(config.listen.interface, None);
        assert_eq!(config.route.destination, Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(config.route.gateway, None);
        assert_eq!(config.route.source_port, 42);
        assert!(config.plugins.modules.is_empty());
        assert!(config.plugin.is_empty());
    }

    #[test]
    fn test_plugins_keep_document_order() {
        let config = SacConfig::from_toml_str(
            r#"
            [plugin.zeta]
            class = "he_dns"
            hostname = "a.example.com"

            [plugin.alpha]
            class = "ast_pjsip"
            conf_file = "/tmp/pjsip.conf"

            [plugin.mid]
            class = "ast_pjsip"
            "#,
        )
        .unwrap();

        let names: Vec<&str> = config.plugin.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(config.plugin[0].config.class(), Some("he_dns"));
        assert_eq!(
            config.plugin[1].config.settings.get("conf_file"),
            Some(&serde_json::json!("/tmp/pjsip.conf"))
        );
        assert!(!config.plugin[0].config.settings.contains_key("class"));
    }

    #[test]
    fn test_missing_class_is_rejected() {
        let err = SacConfig::from_toml_str(
            r#"
            [plugin.dns]
            hostname = "a.example.com"
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("Plugin class not specified: dns"));
    }

    #[test]
    fn test_non_multicast_listen_address_is_rejected() {
        let err = SacConfig::from_toml_str(
            r#"
            [listen]
            address = "192.0.2.1"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_plugin_files_are_rejected() {
        let err = SacConfig::from_toml_str(
            r#"
            [plugins]
            files = ["/usr/local/lib/sac/custom.so"]
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_malformed_address_is_a_toml_error() {
        let err = SacConfig::from_toml_str(
            r#"
            [route]
            gateway = "not-an-address"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_allow_list() {
        let open = PluginsConfig::default();
        assert!(open.allows("anything"));

        let closed = PluginsConfig {
            modules: vec!["he_dns".to_string()],
            files: Vec::new(),
        };
        assert!(closed.allows("he_dns"));
        assert!(!closed.allows("ast_pjsip"));
    }

    #[test]
    fn test_settings_as_typed_struct() {
        #[derive(Deserialize)]
        struct Settings {
            hostname: String,
            nameservers: Vec<String>,
        }

        let config = PluginConfig::new("he_dns")
            .with_setting("hostname", "a.example.com")
            .with_setting("nameservers", vec!["ns1.he.net", "ns2.he.net"]);

        let settings: Settings = config.settings_as().unwrap();
        assert_eq!(settings.hostname, "a.example.com");
        assert_eq!(settings.nameservers, ["ns1.he.net", "ns2.he.net"]);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sac.conf");
        std::fs::write(&path, "[route]\ngateway = \"192.0.2.1\"\n").unwrap();

        let config = SacConfig::from_file(&path).unwrap();
        assert_eq!(config.route.gateway, Some(Ipv4Addr::new(192, 0, 2, 1)));

        let missing = SacConfig::from_file(dir.path().join("absent.conf"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
