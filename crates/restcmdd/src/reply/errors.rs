//! Error types for reply delivery.

use std::io;

use thiserror::Error;

/// Reasons a reply could not be handed to the outbound client.
///
/// Network failures after hand-off are logged by the delivery task and never
/// surface here.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("failed to build reply runtime: {source}")]
    Runtime {
        #[source]
        source: io::Error,
    },
    #[error("failed to build reply HTTP client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    #[error("reply for command '{command_id}' has no route")]
    NoRoute { command_id: String },
    #[error("failed to serialise reply for command '{command_id}': {source}")]
    Serialise {
        command_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("reply for command '{command_id}' is {size} bytes, above the {limit} byte limit")]
    TooLarge {
        command_id: String,
        size: usize,
        limit: usize,
    },
    #[error("reply dispatcher is shut down")]
    Closed,
}
