//! Configuration for the restcmd command relay.
//!
//! The crate turns a connection string such as `rest://ctrl@0.0.0.0:12345`
//! into a validated [`EndpointAddress`] and gathers the remaining relay
//! settings (worker threads, launch policy, registry, logging) from flags and
//! `RESTCMD_*` environment variables.

mod config;
/// Default values for flags, limits and shutdown timing.
pub mod defaults;
mod endpoint;
mod options;

pub use config::{ConfigError, RegistrySettings, RelayConfig};
pub use endpoint::{EndpointAddress, MalformedUri, PortPolicy};
pub use options::{LaunchPolicy, LogFormat};
