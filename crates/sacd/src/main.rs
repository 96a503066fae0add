// # sacd - Source Address Client Daemon
//
// The sacd daemon is a thin integration layer over sac-core:
// 1. Parse the command line and set up logging
// 2. Load the TOML configuration
// 3. Instantiate and initialize the configured backends
// 4. Decide the listener route and join the announcement group
// 5. Run the receive loop until a signal (or, in one-shot mode, the first
//    source address change)
//
// ## Example
//
// ```toml
// [listen]
// interface = "eth0"
//
// [plugin.asterisk]
// class = "ast_pjsip"
//
// [plugin.dns]
// class = "he_dns"
// username = "owner"
// password = "dyndns-key"
// hostname = "sip.example.com"
// nameservers = ["ns1.he.net", "ns2.he.net"]
// ```
//
// ```bash
// sacd --config /etc/sac/sac.conf --stderr
// ```

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use sac_core::{BackendRegistry, PluginRegistry, SacConfig, SacEngine};
use sac_mcast::MulticastReceiver;
use sac_route_netlink::NetlinkRouteResolver;
use std::future::Future;
use std::process::ExitCode;
use tracing::{debug, error, info};

use cli::Args;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown or one-shot completion
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SacExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SacExitCode> for ExitCode {
    fn from(code: SacExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let syslog = logging::use_syslog(args.use_syslog());
    if let Err(e) = logging::init(args.debug, syslog) {
        eprintln!("Failed to set up logging: {:#}", e);
        return SacExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SacExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(args)).into()
}

/// Run the daemon
async fn run_daemon(args: Args) -> SacExitCode {
    let (mut engine, shutdown) = match start(&args).await {
        Ok(started) => started,
        Err(e) => {
            error!("{:#}", e);
            return SacExitCode::ConfigError;
        }
    };

    match engine.run_until(shutdown).await {
        Ok(reason) => {
            debug!("Receive loop stopped: {:?}", reason);
            SacExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            SacExitCode::RuntimeError
        }
    }
}

/// Everything that happens before the first announcement
async fn start(args: &Args) -> Result<(SacEngine, impl Future<Output = ()>)> {
    let shutdown = shutdown_signal()?;

    let config = SacConfig::from_file(&args.config)?;
    debug!("Loaded configuration file: {}", args.config.display());

    let mut registry = BackendRegistry::new();
    register_builtin_backends(&mut registry);

    let mut plugins = PluginRegistry::load(&registry, &config)?;
    plugins.init_all().await;

    let resolver = NetlinkRouteResolver::new();
    let receiver = MulticastReceiver::open(&config, &resolver, args.insecure);
    let receiver = cleanup_on_error(&mut plugins, receiver)
        .await
        .context("Failed to set up announcement listener")?;

    let engine = SacEngine::new(Box::new(receiver), plugins).with_one_shot(args.one_shot);
    Ok((engine, shutdown))
}

/// Pass `result` through, cleaning up initialized plugins if it failed
async fn cleanup_on_error<T>(
    plugins: &mut PluginRegistry,
    result: sac_core::Result<T>,
) -> sac_core::Result<T> {
    if result.is_err() {
        plugins.cleanup_all().await;
    }
    result
}

/// Register the backends compiled into this binary
fn register_builtin_backends(registry: &mut BackendRegistry) {
    #[cfg(feature = "pjsip")]
    sac_backend_pjsip::register(registry);

    #[cfg(feature = "hedns")]
    sac_backend_hedns::register(registry);

    debug!("Available backend classes: {:?}", registry.list_backends());
}

/// Future that resolves on SIGTERM or SIGINT
///
/// Handlers are installed immediately, so signals that arrive during
/// startup are not lost.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;

    Ok(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received {}; exiting", name);
    })
}

/// Future that resolves on CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT; exiting");
        }
    })
}
