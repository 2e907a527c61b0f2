//! Connectivity registry double that records every call.

use std::sync::Mutex;

use crate::registry::{ConnectionId, ConnectionRegistration, ConnectionRegistry, RegistryError};

/// Call observed by [`RecordingRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    /// A registration was published.
    Publish(ConnectionRegistration),
    /// A registration was retracted.
    Retract(ConnectionId),
}

/// Registry that accepts every call and remembers it.
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    calls: Mutex<Vec<RegistryCall>>,
}

impl RecordingRegistry {
    /// Captures a copy of the recorded calls.
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().expect("registry mutex poisoned").clone()
    }

    fn record(&self, call: RegistryCall) {
        self.calls.lock().expect("registry mutex poisoned").push(call);
    }
}

impl ConnectionRegistry for RecordingRegistry {
    fn publish(&self, registration: &ConnectionRegistration) -> Result<(), RegistryError> {
        self.record(RegistryCall::Publish(registration.clone()));
        Ok(())
    }

    fn retract(&self, id: &ConnectionId) -> Result<(), RegistryError> {
        self.record(RegistryCall::Retract(id.clone()));
        Ok(())
    }
}
