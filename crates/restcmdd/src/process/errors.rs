//! Defines the unified error surface for daemon launch and supervision.

use std::io;

use thiserror::Error;

use restcmd_config::ConfigError;

use crate::registry::RegistryError;
use crate::relay::RelayError;
use crate::telemetry::TelemetryError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed validation.
    #[error("invalid configuration: {source}")]
    Config {
        /// Underlying validation error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry could not be initialised.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The registry client could not be built.
    #[error("failed to prepare connectivity registry: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// The relay failed to build, start or shut down.
    #[error("command relay failed: {source}")]
    Relay {
        /// Underlying relay error.
        #[source]
        source: RelayError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// A supervision thread or runtime could not be created.
    #[error("failed to start supervision: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal watcher thread panicked.
    #[error("shutdown signal watcher panicked")]
    WatcherPanic,
}

impl From<ConfigError> for LaunchError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<RegistryError> for LaunchError {
    fn from(source: RegistryError) -> Self {
        Self::Registry { source }
    }
}

impl From<RelayError> for LaunchError {
    fn from(source: RelayError) -> Self {
        Self::Relay { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
