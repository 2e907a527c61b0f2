//! Test helpers for the transport module.

use std::sync::{Arc, Mutex, PoisonError};

use crate::dispatch::CommandEnvelope;

use super::CommandSink;

/// Sink that records every submitted envelope.
#[derive(Default)]
pub(crate) struct RecordingSink {
    envelopes: Mutex<Vec<CommandEnvelope>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn count(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn envelopes(&self) -> Vec<CommandEnvelope> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CommandEnvelope>> {
        self.envelopes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandSink for RecordingSink {
    fn submit(&self, envelope: CommandEnvelope) {
        self.lock().push(envelope);
    }
}
