//! Core source address engine
//!
//! The SacEngine is responsible for:
//! - Reading announcements from an AnnouncementSource
//! - Dropping malformed, "no default route" and unchanged announcements
//! - Dispatching changes to the PluginRegistry
//! - Tracking the current default source address
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │ AnnouncementSource │─── Ipv4Addr ───┐
//! └────────────────────┘                │
//!                                       ▼
//!                              ┌──────────────┐
//!                              │  SacEngine   │
//!                              └──────────────┘
//!                                       │
//!                     ┌─────────────────┴─────────────────┐
//!                     ▼                                   ▼
//!            ┌────────────────┐                  ┌─────────────┐
//!            │ PluginRegistry │                  │   Events    │
//!            │ (dispatch)     │                  │  (notify)   │
//!            └────────────────┘                  └─────────────┘
//! ```
//!
//! ## State machine
//!
//! ```text
//! Init → WaitAnnouncement → (Unchanged | Changed) → WaitAnnouncement → … → Terminated
//! ```
//!
//! The current address starts at [`NO_DEFAULT_ROUTE`] and is replaced after
//! every dispatch cycle, whatever the per-plugin outcomes were.

use std::future::Future;
use std::net::Ipv4Addr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::announcement::NO_DEFAULT_ROUTE;
use crate::error::Result;
use crate::plugin::{DispatchOutcome, PluginRegistry};
use crate::traits::AnnouncementSource;

/// Events emitted by the SacEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        plugins: usize,
        enabled: usize,
    },

    /// Default source address changed; dispatch follows
    SourceChanged {
        previous: Ipv4Addr,
        current: Ipv4Addr,
    },

    /// Plugin already used the new address
    BackendAlreadyCurrent {
        plugin: String,
        address: Ipv4Addr,
    },

    /// Plugin was updated
    BackendUpdated {
        plugin: String,
        address: Ipv4Addr,
    },

    /// Plugin failed and was disabled
    BackendDisabled {
        plugin: String,
        reason: String,
    },

    /// Engine stopped
    Stopped {
        reason: StopReason,
    },
}

/// Why the receive loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown signal received
    Shutdown,
    /// One-shot mode finished its dispatch cycle
    OneShot,
}

/// What a single announcement did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The announcer reported no default route
    NoDefaultRoute,
    /// Same address as the current one
    Unchanged,
    /// New address; plugins were dispatched
    Changed {
        previous: Ipv4Addr,
        current: Ipv4Addr,
    },
}

/// Core source address engine
///
/// ## Lifecycle
///
/// 1. Load and initialize a [`PluginRegistry`]
/// 2. Create with [`SacEngine::new()`]
/// 3. Drive with [`SacEngine::run_until()`] and a shutdown future
/// 4. Plugins are cleaned up when the loop ends
///
/// ## Threading
///
/// One thread of control. Dispatch is sequential and is not interrupted by
/// shutdown: a signal that arrives mid-cycle is acted upon once the cycle
/// is complete.
pub struct SacEngine {
    /// Where announcements come from
    source: Box<dyn AnnouncementSource>,

    /// Configured backends
    plugins: PluginRegistry,

    /// Last observed default source address
    current: Ipv4Addr,

    /// Stop after the first dispatch cycle
    one_shot: bool,

    /// Event sender for external monitoring
    event_tx: Option<mpsc::Sender<EngineEvent>>,
}

impl SacEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `source`: announcement source
    /// - `plugins`: loaded (and normally initialized) plugins
    pub fn new(source: Box<dyn AnnouncementSource>, plugins: PluginRegistry) -> Self {
        Self {
            source,
            plugins,
            current: NO_DEFAULT_ROUTE,
            one_shot: false,
            event_tx: None,
        }
    }

    /// Stop after the first changed announcement has been dispatched
    pub fn with_one_shot(mut self, one_shot: bool) -> Self {
        self.one_shot = one_shot;
        self
    }

    /// Subscribe to engine events
    ///
    /// Replaces any earlier subscription. When the channel is full, events
    /// are dropped with a warning.
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.event_tx = Some(tx);
        rx
    }

    /// Last observed default source address
    pub fn current_source(&self) -> Ipv4Addr {
        self.current
    }

    /// Configured plugins
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Run until `shutdown` resolves or one-shot completion
    ///
    /// Plugins are cleaned up before returning, also when the source fails.
    ///
    /// # Returns
    ///
    /// - `Ok(StopReason)`: Clean stop
    /// - `Err(Error)`: The announcement source failed
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<StopReason>
    where
        F: Future<Output = ()>,
    {
        self.emit_event(EngineEvent::Started {
            plugins: self.plugins.len(),
            enabled: self.plugins.enabled_count(),
        });

        let outcome = self.receive_loop(shutdown).await;

        self.plugins.cleanup_all().await;

        if let Ok(reason) = outcome {
            self.emit_event(EngineEvent::Stopped { reason });
        }
        outcome
    }

    async fn receive_loop<F>(&mut self, shutdown: F) -> Result<StopReason>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    return Ok(StopReason::Shutdown);
                }

                received = self.source.recv() => {
                    let Some(address) = received? else {
                        continue;
                    };

                    let transition = self.handle_announcement(address).await;
                    if self.one_shot && matches!(transition, Transition::Changed { .. }) {
                        info!("One-shot mode selected; exiting");
                        return Ok(StopReason::OneShot);
                    }
                }
            }
        }
    }

    /// Process one well-formed announcement
    pub async fn handle_announcement(&mut self, address: Ipv4Addr) -> Transition {
        if address == NO_DEFAULT_ROUTE {
            info!("Announcer reports no default route ({}); ignoring", address);
            return Transition::NoDefaultRoute;
        }

        if address == self.current {
            debug!("Default source address ({}) has not changed", address);
            return Transition::Unchanged;
        }

        let previous = self.current;
        info!("Default source address changed from {} to {}", previous, address);
        self.emit_event(EngineEvent::SourceChanged {
            previous,
            current: address,
        });

        for report in self.plugins.dispatch(address).await {
            let event = match report.outcome {
                DispatchOutcome::AlreadyCurrent => EngineEvent::BackendAlreadyCurrent {
                    plugin: report.plugin,
                    address,
                },
                DispatchOutcome::Updated => EngineEvent::BackendUpdated {
                    plugin: report.plugin,
                    address,
                },
                DispatchOutcome::Failed(reason) => EngineEvent::BackendDisabled {
                    plugin: report.plugin,
                    reason,
                },
            };
            self.emit_event(event);
        }

        self.current = address;
        Transition::Changed {
            previous,
            current: address,
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        let Some(ref tx) = self.event_tx else {
            return;
        };

        if tx.try_send(event).is_err() {
            warn!("Event channel full or closed, dropping event");
        }
    }
}
