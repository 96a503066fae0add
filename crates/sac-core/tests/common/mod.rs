//! Test doubles and common utilities for contract tests
//!
//! These doubles record every call so tests can assert on exactly which
//! backend hooks ran, in which order, with which address.

#![allow(dead_code)]

use sac_core::announcement;
use sac_core::error::{BackendFailure, BackendResult, Result};
use sac_core::traits::{AnnouncementSource, Backend};
use sac_core::{Plugin, PluginRegistry, SacEngine};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// An announcement source that replays raw payloads
///
/// Once the script is exhausted it signals `exhausted` and then either never
/// returns again or fails, depending on construction.
pub struct ScriptedSource {
    payloads: VecDeque<Vec<u8>>,
    exhausted: Option<oneshot::Sender<()>>,
    fail_when_exhausted: bool,
}

impl ScriptedSource {
    /// Create a source; the receiver fires after the last payload was consumed
    pub fn new(payloads: Vec<Vec<u8>>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let source = Self {
            payloads: payloads.into(),
            exhausted: Some(tx),
            fail_when_exhausted: false,
        };
        (source, rx)
    }

    /// Create a source that returns an I/O error after the last payload
    pub fn failing_after(payloads: Vec<Vec<u8>>) -> Self {
        let (mut source, _rx) = Self::new(payloads);
        source.fail_when_exhausted = true;
        source
    }
}

#[async_trait::async_trait]
impl AnnouncementSource for ScriptedSource {
    async fn recv(&mut self) -> Result<Option<Ipv4Addr>> {
        if let Some(payload) = self.payloads.pop_front() {
            return Ok(announcement::decode(&payload));
        }

        if self.fail_when_exhausted {
            return Err(std::io::Error::other("socket closed").into());
        }

        if let Some(tx) = self.exhausted.take() {
            let _ = tx.send(());
        }
        std::future::pending().await
    }
}

/// Encode an address as an announcement payload
pub fn payload(address: Ipv4Addr) -> Vec<u8> {
    address.octets().to_vec()
}

/// One recorded backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Init,
    Check(Ipv4Addr),
    Update(Ipv4Addr),
    Cleanup,
}

/// Failure switches for a [`RecordingBackend`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub init: bool,
    pub check: bool,
    pub update: bool,
}

/// Handle shared between a test and its [`RecordingBackend`]
#[derive(Clone, Default)]
pub struct Probe {
    calls: Arc<Mutex<Vec<Call>>>,
    current: Arc<Mutex<Option<Ipv4Addr>>>,
}

impl Probe {
    /// All calls so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of update() calls
    pub fn update_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Update(_)))
            .count()
    }

    /// Number of check() or update() calls
    pub fn dispatch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Check(_) | Call::Update(_)))
            .count()
    }

    /// Address the backend currently "uses"
    pub fn current(&self) -> Option<Ipv4Addr> {
        *self.current.lock().unwrap()
    }
}

/// A backend that keeps its address in memory and records every call
pub struct RecordingBackend {
    probe: Probe,
    faults: Faults,
    on_update: Mutex<Option<oneshot::Sender<()>>>,
}

impl RecordingBackend {
    pub fn new() -> (Self, Probe) {
        Self::with_faults(Faults::default())
    }

    pub fn with_faults(faults: Faults) -> (Self, Probe) {
        let probe = Probe::default();
        let backend = Self {
            probe: probe.clone(),
            faults,
            on_update: Mutex::new(None),
        };
        (backend, probe)
    }

    /// Start out already using `address`
    pub fn using(self, address: Ipv4Addr) -> Self {
        *self.probe.current.lock().unwrap() = Some(address);
        self
    }

    /// Fire `tx` from inside the first update() call
    pub fn on_update(self, tx: oneshot::Sender<()>) -> Self {
        *self.on_update.lock().unwrap() = Some(tx);
        self
    }

    fn record(&self, call: Call) {
        self.probe.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl Backend for RecordingBackend {
    async fn init(&mut self) -> BackendResult<()> {
        self.record(Call::Init);
        if self.faults.init {
            return Err(BackendFailure::new("init refused"));
        }
        Ok(())
    }

    async fn check(&self, address: Ipv4Addr) -> BackendResult<bool> {
        self.record(Call::Check(address));
        if self.faults.check {
            return Err(BackendFailure::new("check refused"));
        }
        Ok(self.probe.current() == Some(address))
    }

    async fn update(&self, address: Ipv4Addr) -> BackendResult<()> {
        self.record(Call::Update(address));
        if let Some(tx) = self.on_update.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if self.faults.update {
            return Err(BackendFailure::new("update refused"));
        }
        *self.probe.current.lock().unwrap() = Some(address);
        Ok(())
    }

    async fn cleanup(&mut self) {
        self.record(Call::Cleanup);
    }
}

/// Build a plugin registry from named backends, in order
pub fn registry(backends: Vec<(&str, RecordingBackend)>) -> PluginRegistry {
    let mut plugins = PluginRegistry::new();
    for (name, backend) in backends {
        plugins
            .push(Plugin::new(name, "recording", Box::new(backend)))
            .expect("unique plugin names");
    }
    plugins
}

/// Build an engine that replays `payloads`
///
/// The returned receiver fires once every payload has been consumed; pass it
/// to [`until`] to stop the engine there.
pub fn engine(
    backends: Vec<(&str, RecordingBackend)>,
    payloads: Vec<Vec<u8>>,
) -> (SacEngine, oneshot::Receiver<()>) {
    let (source, exhausted) = ScriptedSource::new(payloads);
    (SacEngine::new(Box::new(source), registry(backends)), exhausted)
}

/// Shutdown future that resolves when `rx` fires (or its sender is dropped)
pub async fn until(rx: oneshot::Receiver<()>) {
    let _ = rx.await;
}

pub const NEW: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);
pub const NEWER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 77);
pub const SENTINEL: Ipv4Addr = Ipv4Addr::UNSPECIFIED;
