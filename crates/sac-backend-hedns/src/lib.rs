// # Hurricane Electric DNS Backend
//
// Keeps an A record hosted by Hurricane Electric's free DNS service pointed
// at the host's default source address.
//
// ## Behaviour
//
// - `init`: resolve the configured nameserver names once
// - `check`: ask those nameservers directly, bypassing caches, whether the
//   record already holds the address
// - `update`: one HTTP GET against the dynamic DNS endpoint
//
// One attempt per call, no retries: a failure disables the backend.
//
// ## Security
//
// The dynamic DNS key (`password`) never appears in logs or `Debug` output.
//
// ## API Reference
//
// `GET <update_url>?hostname=<host>&myip=<address>` with HTTP basic auth
// (user = hostname, password = key). The body's first word is `good` or
// `nochg` on success.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use sac_core::config::PluginConfig;
use sac_core::traits::{Backend, BackendFactory};
use sac_core::{BackendFailure, BackendRegistry, BackendResult, Error, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Class name used in `[plugin.<name>]` tables
pub const CLASS: &str = "he_dns";

/// Dynamic DNS update endpoint
pub const HE_DYNDNS_URL: &str = "https://dyn.dns.he.net/nic/update";

/// Time allowed to resolve each nameserver name
const NAMESERVER_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Default HTTP timeout for update requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const DNS_PORT: u16 = 53;

fn default_update_url() -> String {
    HE_DYNDNS_URL.to_string()
}

#[derive(Deserialize)]
struct HeDnsSettings {
    username: String,
    password: String,
    hostname: String,
    nameservers: Vec<String>,
    #[serde(default = "default_update_url")]
    update_url: String,
}

/// Hurricane Electric DNS backend
pub struct HeDnsBackend {
    name: String,

    /// Account name; informational only, the update API authenticates
    /// with the hostname
    username: String,

    /// Dynamic DNS key for `hostname`
    /// ⚠️ NEVER log this value
    password: String,

    /// Record to keep current
    hostname: String,

    /// Nameserver host names, resolved by `init`
    ns_names: Vec<String>,

    update_url: String,

    client: reqwest::Client,

    /// Resolver aimed at the authoritative nameservers
    resolver: Option<TokioAsyncResolver>,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for HeDnsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeDnsBackend")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("hostname", &self.hostname)
            .field("nameservers", &self.ns_names)
            .field("update_url", &self.update_url)
            .finish()
    }
}

impl HeDnsBackend {
    fn from_settings(name: &str, settings: HeDnsSettings) -> Result<Self> {
        if settings.password.is_empty() {
            return Err(Error::plugin(name, "he_dns password is required"));
        }
        if settings.nameservers.is_empty() {
            return Err(Error::plugin(name, "he_dns needs at least one nameserver"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::plugin(name, format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.to_string(),
            username: settings.username,
            password: settings.password,
            hostname: settings.hostname,
            ns_names: settings.nameservers,
            update_url: settings.update_url,
            client,
            resolver: None,
        })
    }

    /// Fully qualified form of `hostname`, so no search domain is applied
    fn fqdn(&self) -> String {
        if self.hostname.ends_with('.') {
            self.hostname.clone()
        } else {
            format!("{}.", self.hostname)
        }
    }

    async fn resolve_nameservers(&self) -> BTreeSet<IpAddr> {
        let mut addresses = BTreeSet::new();

        for ns in &self.ns_names {
            let lookup = tokio::time::timeout(
                NAMESERVER_LOOKUP_TIMEOUT,
                tokio::net::lookup_host((ns.as_str(), DNS_PORT)),
            )
            .await;

            match lookup {
                Ok(Ok(found)) => addresses.extend(found.map(|sa| sa.ip())),
                Ok(Err(e)) => warn!("Failed to resolve {}: {}", ns, e),
                Err(_) => warn!("Failed to resolve {}: timed out", ns),
            }
        }

        addresses
    }
}

/// Whether an A record set holds exactly `address`
fn is_single_record(records: &[Ipv4Addr], address: Ipv4Addr) -> bool {
    records == [address]
}

/// Interpret a dynamic DNS update response
fn parse_update_response(status: u16, body: &str) -> BackendResult<()> {
    let result = body.split_whitespace().next();

    if status != 200 || !matches!(result, Some("good") | Some("nochg")) {
        return Err(BackendFailure::new(format!(
            "Failed to update DNS: {}: {}",
            status,
            body.trim()
        )));
    }
    Ok(())
}

#[async_trait]
impl Backend for HeDnsBackend {
    async fn init(&mut self) -> BackendResult<()> {
        let addresses: Vec<IpAddr> = self.resolve_nameservers().await.into_iter().collect();
        if addresses.is_empty() {
            return Err(BackendFailure::new("Failed to resolve any nameservers"));
        }
        debug!("{}: nameservers: {:?}", self.name, addresses);

        let group = NameServerConfigGroup::from_ips_clear(&addresses, DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.cache_size = 0;
        self.resolver = Some(TokioAsyncResolver::tokio(config, opts));
        Ok(())
    }

    async fn check(&self, address: Ipv4Addr) -> BackendResult<bool> {
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| BackendFailure::new("Nameservers not resolved"))?;

        let records: Vec<Ipv4Addr> = match resolver.ipv4_lookup(self.fqdn()).await {
            Ok(lookup) => lookup.iter().map(|a| a.0).collect(),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                debug!("{}: no A record for {}", self.name, self.hostname);
                Vec::new()
            }
            Err(e) => {
                return Err(BackendFailure::new(format!(
                    "Failed to look up {}: {}",
                    self.hostname, e
                )));
            }
        };

        debug!("{}: {} has A records {:?}", self.name, self.hostname, records);
        Ok(is_single_record(&records, address))
    }

    async fn update(&self, address: Ipv4Addr) -> BackendResult<()> {
        let myip = address.to_string();
        let response = self
            .client
            .get(&self.update_url)
            .basic_auth(&self.hostname, Some(&self.password))
            .query(&[("hostname", self.hostname.as_str()), ("myip", myip.as_str())])
            .send()
            .await
            .map_err(|e| BackendFailure::new(format!("HTTP request failed: {}", e.without_url())))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response".to_string());

        parse_update_response(status, &body)?;
        info!("Set DNS record for {} to {}", self.hostname, address);
        Ok(())
    }
}

/// Factory for creating Hurricane Electric DNS backends
pub struct HeDnsFactory;

impl BackendFactory for HeDnsFactory {
    fn create(&self, name: &str, config: &PluginConfig) -> Result<Box<dyn Backend>> {
        let settings: HeDnsSettings = config
            .settings_as()
            .map_err(|e| Error::plugin(name, format!("Invalid {} settings: {}", CLASS, e)))?;
        Ok(Box::new(HeDnsBackend::from_settings(name, settings)?))
    }
}

/// Register the Hurricane Electric DNS backend with a registry
///
/// # Example
///
/// ```rust
/// use sac_core::BackendRegistry;
///
/// let mut registry = BackendRegistry::new();
/// sac_backend_hedns::register(&mut registry);
/// assert!(registry.has_backend("he_dns"));
/// ```
pub fn register(registry: &mut BackendRegistry) {
    registry.register_backend(CLASS, Box::new(HeDnsFactory));
}
