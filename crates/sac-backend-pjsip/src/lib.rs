// # Asterisk PJSIP Backend
//
// Keeps `external_media_address` and `external_signaling_address` in
// Asterisk's `pjsip.conf` pointed at the host's default source address.
//
// ## Division of Labour
//
// This backend never touches the live configuration. `update` writes a
// rewritten copy to `new_conf_file` and touches `reload_flag_file`; a
// separate privileged job installs the copy and reloads Asterisk. `check`
// therefore keeps reporting the old address until that job has run, and a
// repeated update of the same address is harmless.
//
// ## Settings
//
// | key | default |
// |---|---|
// | `conf_file` | `/etc/asterisk/pjsip.conf` |
// | `state_dir` | `/run/sac_ast_pjsip` |
// | `new_conf_file` | `<state_dir>/<basename of conf_file>` |
// | `reload_flag_file` | `<state_dir>/pjsip_reload_needed` |

use async_trait::async_trait;
use regex::bytes::Regex;
use sac_core::config::PluginConfig;
use sac_core::traits::{Backend, BackendFactory};
use sac_core::{BackendFailure, BackendRegistry, BackendResult, Error, Result};
use serde::Deserialize;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::debug;

/// Class name used in `[plugin.<name>]` tables
pub const CLASS: &str = "ast_pjsip";

const DEFAULT_CONF_FILE: &str = "/etc/asterisk/pjsip.conf";
const DEFAULT_STATE_DIR: &str = "/run/sac_ast_pjsip";
const DEFAULT_FLAG_FILE: &str = "pjsip_reload_needed";

/// Dotted quad as Asterisk writes it
const OCTETS: &str = r"[12]?[0-9]?[0-9]\.[12]?[0-9]?[0-9]\.[12]?[0-9]?[0-9]\.[12]?[0-9]?[0-9]";

/// A pjsip.conf key whose value must appear exactly once
struct ConfKey {
    name: &'static str,
    pattern: Regex,
}

impl ConfKey {
    fn new(name: &'static str) -> Self {
        let pattern = Regex::new(&format!(r"(?m)^{} = ({})$", name, OCTETS))
            .expect("static pattern");
        Self { name, pattern }
    }
}

static MEDIA_ADDRESS: LazyLock<ConfKey> = LazyLock::new(|| ConfKey::new("external_media_address"));

static SIGNALING_ADDRESS: LazyLock<ConfKey> =
    LazyLock::new(|| ConfKey::new("external_signaling_address"));

static SUBSTITUTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?m)^(?P<key>external_(?:media|signaling)_address = ){}$",
        OCTETS
    ))
    .expect("static pattern")
});

#[derive(Debug, Default, Deserialize)]
struct PjsipSettings {
    conf_file: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    new_conf_file: Option<PathBuf>,
    reload_flag_file: Option<PathBuf>,
}

/// Asterisk PJSIP backend
#[derive(Debug, Clone)]
pub struct PjsipBackend {
    name: String,
    conf_file: PathBuf,
    new_conf_file: PathBuf,
    flag_file: PathBuf,
}

impl PjsipBackend {
    /// Create a backend with explicit paths
    pub fn new(
        name: impl Into<String>,
        conf_file: impl Into<PathBuf>,
        new_conf_file: impl Into<PathBuf>,
        flag_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            conf_file: conf_file.into(),
            new_conf_file: new_conf_file.into(),
            flag_file: flag_file.into(),
        }
    }

    fn from_settings(name: &str, settings: PjsipSettings) -> Self {
        let conf_file = settings
            .conf_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONF_FILE));
        let state_dir = settings
            .state_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

        let new_conf_file = settings.new_conf_file.unwrap_or_else(|| match conf_file.file_name() {
            Some(base) => state_dir.join(base),
            None => state_dir.join("pjsip.conf"),
        });
        let flag_file = settings
            .reload_flag_file
            .unwrap_or_else(|| state_dir.join(DEFAULT_FLAG_FILE));

        let backend = Self::new(name, conf_file, new_conf_file, flag_file);
        debug!("{}: conf_file: {}", name, backend.conf_file.display());
        debug!("{}: new_conf_file: {}", name, backend.new_conf_file.display());
        debug!("{}: reload_flag_file: {}", name, backend.flag_file.display());
        backend
    }

    /// Live configuration file
    pub fn conf_file(&self) -> &Path {
        &self.conf_file
    }

    /// Where the rewritten configuration goes
    pub fn new_conf_file(&self) -> &Path {
        &self.new_conf_file
    }

    /// File touched after every rewrite
    pub fn flag_file(&self) -> &Path {
        &self.flag_file
    }

    async fn read_conf(&self) -> BackendResult<Vec<u8>> {
        tokio::fs::read(&self.conf_file).await.map_err(|e| {
            BackendFailure::new(format!("Failed to read {}: {}", self.conf_file.display(), e))
        })
    }

    /// Value of `key`, which must occur exactly once
    fn value_of<'a>(&self, key: &ConfKey, conf: &'a [u8]) -> BackendResult<&'a [u8]> {
        let mut matches = key.pattern.captures_iter(conf);

        let Some(first) = matches.next() else {
            return Err(BackendFailure::new(format!(
                "{} not found in {}",
                key.name,
                self.conf_file.display()
            )));
        };
        if matches.next().is_some() {
            return Err(BackendFailure::new(format!(
                "{} found more than once in {}",
                key.name,
                self.conf_file.display()
            )));
        }

        Ok(first.get(1).map_or(&[][..], |m| m.as_bytes()))
    }

    async fn write_new_conf(&self, content: &[u8]) -> BackendResult<()> {
        match tokio::fs::remove_file(&self.new_conf_file).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BackendFailure::new(format!(
                    "Failed to remove {}: {}",
                    self.new_conf_file.display(),
                    e
                )));
            }
        }

        tokio::fs::write(&self.new_conf_file, content).await.map_err(|e| {
            BackendFailure::new(format!("Failed to write {}: {}", self.new_conf_file.display(), e))
        })?;

        self.touch_flag_file().await.map_err(|e| {
            BackendFailure::new(format!("Failed to touch {}: {}", self.flag_file.display(), e))
        })
    }

    async fn touch_flag_file(&self) -> std::io::Result<()> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.flag_file)
            .await?;
        file.into_std().await.set_modified(SystemTime::now())
    }
}

#[async_trait]
impl Backend for PjsipBackend {
    async fn check(&self, address: Ipv4Addr) -> BackendResult<bool> {
        let conf = self.read_conf().await?;
        let wanted = address.to_string();

        let media = self.value_of(&MEDIA_ADDRESS, &conf)?;
        let signaling = self.value_of(&SIGNALING_ADDRESS, &conf)?;
        Ok(media == wanted.as_bytes() && signaling == wanted.as_bytes())
    }

    async fn update(&self, address: Ipv4Addr) -> BackendResult<()> {
        let old = self.read_conf().await?;
        self.value_of(&MEDIA_ADDRESS, &old)?;
        self.value_of(&SIGNALING_ADDRESS, &old)?;

        let replacement = format!("${{key}}{}", address);
        let new = SUBSTITUTION.replace_all(&old, replacement.as_bytes());
        self.write_new_conf(&new).await?;

        debug!(
            "{}: Wrote {} and flagged reload",
            self.name,
            self.new_conf_file.display()
        );
        Ok(())
    }
}

/// Factory for creating PJSIP backends
pub struct PjsipFactory;

impl BackendFactory for PjsipFactory {
    fn create(&self, name: &str, config: &PluginConfig) -> Result<Box<dyn Backend>> {
        let settings: PjsipSettings = config
            .settings_as()
            .map_err(|e| Error::plugin(name, format!("Invalid {} settings: {}", CLASS, e)))?;
        Ok(Box::new(PjsipBackend::from_settings(name, settings)))
    }
}

/// Register the PJSIP backend with a registry
///
/// # Example
///
/// ```rust
/// use sac_core::BackendRegistry;
///
/// let mut registry = BackendRegistry::new();
/// sac_backend_pjsip::register(&mut registry);
/// assert!(registry.has_backend("ast_pjsip"));
/// ```
pub fn register(registry: &mut BackendRegistry) {
    registry.register_backend(CLASS, Box::new(PjsipFactory));
}
