//! Service-registry announcement of the bound command endpoint.
//!
//! After the listener binds, the relay publishes a [`ConnectionRegistration`]
//! so peers can discover the control endpoint (including an OS-chosen port),
//! and retracts it again on shutdown. Registry failures are logged and never
//! stop the listener; only a failure to resolve the local address is fatal.

mod announcer;
mod errors;
mod http;
mod types;

pub use self::announcer::{HostResolver, RegistryAnnouncer, resolve_local_ipv4};
pub use self::errors::RegistryError;
pub use self::http::HttpConnectivityRegistry;
pub use self::types::{ConnectionId, ConnectionRegistration, Direction};

/// Directory that maps logical endpoint names to bound addresses.
pub trait ConnectionRegistry: Send + Sync + 'static {
    /// Announces a connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the registry cannot be reached or
    /// refuses the registration.
    fn publish(&self, registration: &ConnectionRegistration) -> Result<(), RegistryError>;

    /// Withdraws a previously announced connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the registry cannot be reached or
    /// refuses the request.
    fn retract(&self, id: &ConnectionId) -> Result<(), RegistryError>;
}

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");
