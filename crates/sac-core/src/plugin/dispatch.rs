//! Per-plugin dispatch of a new source address

use std::net::Ipv4Addr;
use tracing::{debug, info};

use super::PluginRegistry;

/// Result of one plugin's update attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// `check` reported the address is already in use
    AlreadyCurrent,
    /// `update` succeeded
    Updated,
    /// `check` or `update` failed; the plugin is now disabled
    Failed(String),
}

/// Outcome for a named plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Plugin name
    pub plugin: String,
    /// What happened
    pub outcome: DispatchOutcome,
}

impl PluginRegistry {
    /// Apply a new source address to every enabled plugin
    ///
    /// Plugins are processed sequentially in registration order. Disabled
    /// plugins are skipped and do not appear in the returned reports.
    pub async fn dispatch(&mut self, address: Ipv4Addr) -> Vec<DispatchReport> {
        let mut reports = Vec::with_capacity(self.plugins.len());

        for plugin in &mut self.plugins {
            if plugin.disabled {
                debug!("Skipping disabled plugin: {}", plugin.name);
                continue;
            }

            let outcome = match plugin.backend.check(address).await {
                Ok(true) => {
                    info!("{}: already using new source address", plugin.name);
                    DispatchOutcome::AlreadyCurrent
                }
                Ok(false) => {
                    info!("{}: not using new source address; updating", plugin.name);
                    match plugin.backend.update(address).await {
                        Ok(()) => {
                            info!("{}: updated with new source address", plugin.name);
                            DispatchOutcome::Updated
                        }
                        Err(failure) => {
                            plugin.disable(&failure);
                            DispatchOutcome::Failed(failure.reason().to_string())
                        }
                    }
                }
                Err(failure) => {
                    plugin.disable(&failure);
                    DispatchOutcome::Failed(failure.reason().to_string())
                }
            };

            reports.push(DispatchReport {
                plugin: plugin.name.clone(),
                outcome,
            });
        }

        reports
    }
}
