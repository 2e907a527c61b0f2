//! Supervises daemon launch sequencing and the run-until-cancelled loop.

use std::sync::Arc;
use std::thread;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use restcmd_config::RelayConfig;

use crate::commanded::CountingProcessor;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::registry::{ConnectionRegistry, HttpConnectivityRegistry};
use crate::relay::{CommandRelay, RelaySettings};
use crate::telemetry;

use super::errors::LaunchError;
use super::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
use super::{PROCESS_TARGET, STATS_INTERVAL};

/// Runs the daemon with the production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] when signal handlers cannot be installed or when
/// configuration, telemetry, relay start-up or shutdown fails.
pub fn run_daemon(config: &RelayConfig) -> Result<(), LaunchError> {
    let signal = SystemShutdownSignal::install()?;
    run_with(
        config,
        Arc::new(signal),
        Arc::new(StructuredHealthReporter::new()),
    )
}

/// Runs the daemon with injected shutdown and health collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when configuration, telemetry, relay start-up or
/// shutdown fails. Nothing is bound when validation fails.
pub fn run_with(
    config: &RelayConfig,
    signal: Arc<dyn ShutdownSignal>,
    reporter: Arc<dyn HealthReporter>,
) -> Result<(), LaunchError> {
    config.validate()?;
    telemetry::initialise(config)?;

    let registry = match config.registry()? {
        Some(settings) => {
            let client = HttpConnectivityRegistry::new(&settings.url, settings.session)?;
            Some(Arc::new(client) as Arc<dyn ConnectionRegistry>)
        }
        None => None,
    };
    let processor = Arc::new(CountingProcessor::new(
        config.rejected_commands.iter().cloned(),
    ));
    let mut relay = CommandRelay::from_uri(
        &config.uri,
        processor.clone(),
        RelaySettings::from_config(config),
        registry,
    )?
    .with_reporter(reporter);
    relay.init()?;
    let local_addr = relay.start()?;
    info!(
        target: PROCESS_TARGET,
        app_name = %config.app_name,
        local_addr = %local_addr,
        "relay running"
    );

    let cancel = CancellationToken::new();
    let watcher = spawn_watcher(signal, cancel.clone())?;
    let stats = processor
        .spawn_reporter(cancel.clone(), STATS_INTERVAL)
        .map_err(|source| LaunchError::Runtime { source })?;

    let outcome = run_relay(&mut relay, &cancel);
    cancel.cancel();
    if stats.join().is_err() {
        warn!(target: PROCESS_TARGET, "stats reporter panicked");
    }
    outcome?;

    // Only the watcher cancels the token, so it has returned by now.
    watcher.join().map_err(|_| LaunchError::WatcherPanic)??;
    info!(
        target: PROCESS_TARGET,
        executed = processor.executed(),
        "shutdown sequence completed"
    );
    Ok(())
}

/// Blocks until `cancel` fires, then shuts `relay` down.
///
/// # Errors
///
/// Returns [`LaunchError::Runtime`] when the wait runtime cannot be built
/// (the relay is still shut down) and [`LaunchError::Relay`] when shutdown
/// fails.
pub fn run_relay(relay: &mut CommandRelay, cancel: &CancellationToken) -> Result<(), LaunchError> {
    let waited = tokio::runtime::Builder::new_current_thread()
        .build()
        .map(|runtime| runtime.block_on(cancel.cancelled()))
        .map_err(|source| LaunchError::Runtime { source });
    info!(target: PROCESS_TARGET, "shutdown requested");
    let stopped = relay.shutdown();
    waited?;
    stopped?;
    Ok(())
}

fn spawn_watcher(
    signal: Arc<dyn ShutdownSignal>,
    cancel: CancellationToken,
) -> Result<thread::JoinHandle<Result<(), ShutdownError>>, LaunchError> {
    thread::Builder::new()
        .name("restcmd-signals".to_owned())
        .spawn(move || {
            let outcome = signal.wait();
            cancel.cancel();
            outcome
        })
        .map_err(|source| LaunchError::Runtime { source })
}
