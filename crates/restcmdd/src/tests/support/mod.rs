//! Test harness utilities for the relay behavioural suites.

mod processor;
mod registry;
mod reporter;

pub use processor::ScriptedProcessor;
pub use registry::{RecordingRegistry, RegistryCall};
pub use reporter::{HealthEvent, RecordingHealthReporter};
