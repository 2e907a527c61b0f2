//! Structured health reporting for relay lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use restcmd_config::EndpointAddress;

use crate::registry::ConnectionRegistration;
use crate::relay::RelayError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the listener binds.
    fn relay_starting(&self, endpoint: &EndpointAddress);

    /// Invoked once the listener serves and the drain worker runs.
    fn relay_started(&self, endpoint: &EndpointAddress, local_addr: SocketAddr);

    /// Invoked when start-up fails.
    fn relay_failed(&self, error: &RelayError);

    /// Invoked after the endpoint was announced to the registry.
    fn endpoint_announced(&self, registration: &ConnectionRegistration);

    /// Invoked when shutdown begins.
    fn relay_stopping(&self);

    /// Invoked after every relay thread has been joined.
    fn relay_stopped(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn relay_starting(&self, endpoint: &EndpointAddress) {
        (**self).relay_starting(endpoint);
    }

    fn relay_started(&self, endpoint: &EndpointAddress, local_addr: SocketAddr) {
        (**self).relay_started(endpoint, local_addr);
    }

    fn relay_failed(&self, error: &RelayError) {
        (**self).relay_failed(error);
    }

    fn endpoint_announced(&self, registration: &ConnectionRegistration) {
        (**self).endpoint_announced(registration);
    }

    fn relay_stopping(&self) {
        (**self).relay_stopping();
    }

    fn relay_stopped(&self) {
        (**self).relay_stopped();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn relay_starting(&self, endpoint: &EndpointAddress) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "relay_starting",
            endpoint = %endpoint,
            "starting command relay"
        );
    }

    fn relay_started(&self, endpoint: &EndpointAddress, local_addr: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "relay_started",
            endpoint = %endpoint,
            local_addr = %local_addr,
            "command relay ready"
        );
    }

    fn relay_failed(&self, error: &RelayError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "relay_failed",
            error = %error,
            "command relay failed to start"
        );
    }

    fn endpoint_announced(&self, registration: &ConnectionRegistration) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "endpoint_announced",
            uid = %registration.uid,
            uri = %registration.uri,
            "command endpoint announced"
        );
    }

    fn relay_stopping(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "relay_stopping",
            "stopping command relay"
        );
    }

    fn relay_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "relay_stopped",
            "command relay stopped"
        );
    }
}
