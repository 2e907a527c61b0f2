//! Test double for [`HealthReporter`] that records structured events for
//! assertions.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use restcmd_config::EndpointAddress;

use crate::health::HealthReporter;
use crate::registry::ConnectionRegistration;
use crate::relay::RelayError;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Start-up began.
    RelayStarting,
    /// The relay serves on the given address.
    RelayStarted(SocketAddr),
    /// Start-up failed with an error description.
    RelayFailed(String),
    /// The endpoint was announced under the given URI.
    EndpointAnnounced(String),
    /// Shutdown began.
    RelayStopping,
    /// Shutdown completed.
    RelayStopped,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Polls until the relay reported its bound address.
    pub fn wait_for_start(&self, timeout: Duration) -> Option<SocketAddr> {
        let deadline = Instant::now() + timeout;
        loop {
            let started = self.events().into_iter().find_map(|event| match event {
                HealthEvent::RelayStarted(addr) => Some(addr),
                _ => None,
            });
            if started.is_some() || Instant::now() >= deadline {
                return started;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn relay_starting(&self, _endpoint: &EndpointAddress) {
        self.record(HealthEvent::RelayStarting);
    }

    fn relay_started(&self, _endpoint: &EndpointAddress, local_addr: SocketAddr) {
        self.record(HealthEvent::RelayStarted(local_addr));
    }

    fn relay_failed(&self, error: &RelayError) {
        self.record(HealthEvent::RelayFailed(error.to_string()));
    }

    fn endpoint_announced(&self, registration: &ConnectionRegistration) {
        self.record(HealthEvent::EndpointAnnounced(registration.uri.clone()));
    }

    fn relay_stopping(&self) {
        self.record(HealthEvent::RelayStopping);
    }

    fn relay_stopped(&self) {
        self.record(HealthEvent::RelayStopped);
    }
}
