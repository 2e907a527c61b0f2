//! HTTP command relay.
//!
//! A caller posts a JSON command to `POST /command` together with an
//! `X-Answer-Port` header. The relay acknowledges with `202 Accepted` straight
//! away, runs the command through an injected [`CommandProcessor`] on its own
//! worker, and later posts the [`CommandReply`] to
//! `http://{answer_host}:{answer_port}/response`. Slow commands never hold up
//! the acknowledgement or reply of other commands.
//!
//! The relay can announce its bound endpoint to a connectivity registry so
//! peers find it by logical name; see [`ConnectionRegistry`].
//!
//! The `restcmdd` binary wires the relay to a [`CountingProcessor`], installs
//! structured telemetry and runs until a termination signal arrives.

pub mod commanded;
pub mod dispatch;
mod health;
mod process;
pub mod registry;
mod relay;
pub mod reply;
mod telemetry;
pub mod transport;

pub use commanded::CountingProcessor;
pub use dispatch::{CommandEnvelope, CommandProcessor, CommandReply, ProcessError, ReplyRoute};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_relay,
    run_with,
};
pub use registry::{ConnectionRegistry, HttpConnectivityRegistry, RegistryError};
pub use relay::{CommandRelay, RelayError, RelaySettings};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
