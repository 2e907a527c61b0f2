//! Error types for the command listener.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding or running the command listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error("failed to bind TCP listener at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to build listener runtime: {source}")]
    Runtime {
        #[source]
        source: io::Error,
    },
    #[error("listener must be initialised before it is started")]
    NotInitialised,
    #[error("listener is already running on {addr}")]
    AlreadyStarted { addr: SocketAddr },
    #[error("listener needs at least one worker thread")]
    ZeroThreads,
    #[error("failed to spawn listener thread: {source}")]
    ThreadSpawn {
        #[source]
        source: io::Error,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Reasons a command request is rejected before dispatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestRejection {
    #[error("content type must be application/json")]
    UnsupportedContentType,
    #[error("request body is not a JSON document")]
    MalformedJson,
    #[error("missing X-Answer-Port header")]
    MissingAnswerPort,
    #[error("invalid X-Answer-Port header: {value}")]
    InvalidAnswerPort { value: String },
}
