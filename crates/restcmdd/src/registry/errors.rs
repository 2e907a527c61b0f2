//! Error types for registry announcements.

use std::io;

use thiserror::Error;

/// Errors raised while announcing or withdrawing the endpoint.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read local hostname: {source}")]
    Hostname {
        #[source]
        source: nix::Error,
    },
    #[error("local hostname is not valid UTF-8")]
    HostnameEncoding,
    #[error("failed to resolve local hostname {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("local hostname {host} has no IPv4 address")]
    NoIpv4Address { host: String },
    #[error("invalid registry endpoint {base}: {source}")]
    Endpoint {
        base: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to encode registry request: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("registry request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("registry at {url} answered with status {status}")]
    Rejected { url: String, status: u16 },
}

impl RegistryError {
    /// Returns true for failures to determine the local address.
    ///
    /// These abort the announcement itself; every other error only affects
    /// registry bookkeeping.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::Hostname { .. }
                | Self::HostnameEncoding
                | Self::Resolution { .. }
                | Self::NoIpv4Address { .. }
        )
    }
}
