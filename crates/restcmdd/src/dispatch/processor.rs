//! Command processor capability injected into the relay.

use serde_json::Value;
use thiserror::Error;

use super::command::CommandReply;

/// Executes parsed commands on behalf of the relay.
///
/// Implementations are invoked concurrently from several threads and may be
/// slow; the relay never calls them on the HTTP worker pool.
pub trait CommandProcessor: Send + Sync + 'static {
    /// Processes one command document and produces its reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when the command cannot be executed; the relay
    /// turns the error into a failed reply for the caller.
    fn process(&self, command: &Value) -> Result<CommandReply, ProcessError>;
}

impl<F> CommandProcessor for F
where
    F: Fn(&Value) -> Result<CommandReply, ProcessError> + Send + Sync + 'static,
{
    fn process(&self, command: &Value) -> Result<CommandReply, ProcessError> {
        self(command)
    }
}

/// Failure reported by a [`CommandProcessor`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProcessError {
    message: String,
}

impl ProcessError {
    /// Builds an error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
