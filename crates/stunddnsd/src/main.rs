// # stunddnsd - STUN-driven DDNS Daemon
//
// This daemon is a THIN integration layer:
// 1. Reading settings (JSON file + environment overrides, see `settings.rs`)
// 2. Initializing logging and the runtime
// 3. Wiring the STUN client and the Alidns provider into the loop
// 4. Forwarding SIGTERM/SIGINT into the loop's shutdown signal
//
// Discovery, reconciliation and scheduling all live in stunddns-core.
//
// ## Example
//
// ```bash
// export DDNS_DOMAIN=home.example.com
// export DDNS_ACCESS_KEY_ID=your_key_id
// export DDNS_ACCESS_KEY_SECRET=your_key_secret
//
// stunddnsd
// ```

mod settings;

use anyhow::Result;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

use settings::Settings;
use stunddns_core::{DdnsConfig, ReconciliationLoop};
use stunddns_provider_alidns::AlidnsProvider;
use stunddns_stun::StunClient;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let log_level = match settings.level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting stunddnsd daemon");
    info!("Effective configuration: {:?}", settings.ddns);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(settings.ddns).await {
            error!("Daemon error: {:#}", e);
            DdnsExitCode::RuntimeError
        } else {
            DdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: DdnsConfig) -> Result<()> {
    let provider = AlidnsProvider::new(&config.provider)?;
    let client = StunClient::new();

    let (engine, mut events) =
        ReconciliationLoop::new(Box::new(client), Box::new(provider), config)?;

    // Install handlers before the loop starts so a failure is a startup error.
    let signals = ShutdownSignals::install()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signal_task = tokio::spawn(async move {
        let name = signals.recv().await;
        info!("Received shutdown signal: {}", name);
        let _ = shutdown_tx.send(true);
    });

    let drain_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "Engine event");
        }
    });

    let result = engine.run_with_shutdown(shutdown_rx).await;

    // Dropping the loop closes the event channel, which ends the drain task.
    drop(engine);
    signal_task.abort();
    let _ = drain_task.await;

    info!("Shutting down daemon");
    result.map_err(Into::into)
}

/// SIGTERM and SIGINT listeners
#[cfg(unix)]
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Wait for either signal and return its name
    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// CTRL-C listener
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                error!("Failed to wait for CTRL-C: {}", e);
                std::future::pending().await
            }
        }
    }
}
