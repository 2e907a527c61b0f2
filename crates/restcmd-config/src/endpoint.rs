//! Connection-string parsing for the relay endpoint.
//!
//! Endpoints are written as `scheme://[name@]host:port`. The scheme is kept
//! for announcements, the optional logical name identifies the endpoint in
//! logs, and the port must fit in 16 bits. Port `0` asks the operating system
//! for an ephemeral port and is only meaningful when a registry will announce
//! the port that was actually bound.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SCHEME_SEPARATOR: &str = "://";

/// Controls whether port `0` is accepted while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortPolicy {
    /// Only explicit, non-zero ports are accepted.
    FixedOnly,
    /// Port `0` is accepted because a registry announces the bound port.
    AllowEphemeral,
}

/// Validated endpoint address parsed from a connection string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAddress {
    scheme: String,
    logical_name: String,
    host: String,
    port: u16,
}

impl EndpointAddress {
    /// Parses and validates `scheme://[name@]host:port`.
    ///
    /// The logical name defaults to the host when no `name@` prefix is given.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedUri`] when the separator, host or port are missing,
    /// when the port is not an integer in `0..=65535`, or when the port is `0`
    /// under [`PortPolicy::FixedOnly`].
    pub fn parse(input: &str, policy: PortPolicy) -> Result<Self, MalformedUri> {
        let (scheme, remainder) = input
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| MalformedUri::MissingSeparator(input.to_owned()))?;
        if scheme.is_empty() {
            return Err(MalformedUri::MissingScheme(input.to_owned()));
        }
        if remainder.is_empty() {
            return Err(MalformedUri::MissingInterface(input.to_owned()));
        }

        let (authority, port_text) = remainder
            .rsplit_once(':')
            .ok_or_else(|| MalformedUri::MissingPort(input.to_owned()))?;
        if port_text.is_empty() {
            return Err(MalformedUri::MissingPort(input.to_owned()));
        }

        let (name, bracketed_host) = match authority.split_once('@') {
            Some((name, host)) => (Some(name), host),
            None => (None, authority),
        };
        let host = bracketed_host
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(bracketed_host);
        if host.is_empty() {
            return Err(MalformedUri::MissingHost(input.to_owned()));
        }
        let logical_name = name.unwrap_or(host);
        if logical_name.is_empty() {
            return Err(MalformedUri::MissingName(input.to_owned()));
        }

        let port = parse_port(port_text)?;
        if port == 0 && policy == PortPolicy::FixedOnly {
            return Err(MalformedUri::EphemeralWithoutRegistry(input.to_owned()));
        }

        Ok(Self {
            scheme: scheme.to_owned(),
            logical_name: logical_name.to_owned(),
            host: host.to_owned(),
            port,
        })
    }

    /// Scheme used when announcing the endpoint (for example `rest`).
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Logical endpoint name.
    #[must_use]
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Interface host the listener binds to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Configured port; `0` requests an ephemeral port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns true when the listener should bind an OS-chosen port.
    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        self.port == 0
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}://", self.scheme)?;
        if self.logical_name != self.host {
            write!(formatter, "{}@", self.logical_name)?;
        }
        if self.host.contains(':') {
            write!(formatter, "[{}]:{}", self.host, self.port)
        } else {
            write!(formatter, "{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(text: &str) -> Result<u16, MalformedUri> {
    // No trimming: whitespace anywhere in the port makes the URI invalid.
    let value: i64 = text
        .parse()
        .map_err(|_| MalformedUri::InvalidPort(text.to_owned()))?;
    u16::try_from(value).map_err(|_| MalformedUri::PortOutOfRange(text.to_owned()))
}

/// Errors encountered while parsing an [`EndpointAddress`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedUri {
    /// The `://` separator was absent.
    #[error("malformed URI '{0}': missing '://' separator")]
    MissingSeparator(String),
    /// Nothing preceded the separator.
    #[error("malformed URI '{0}': missing scheme")]
    MissingScheme(String),
    /// Nothing followed the separator.
    #[error("missing interface name in '{0}'")]
    MissingInterface(String),
    /// The `name@` prefix was present but empty.
    #[error("missing logical endpoint name in '{0}'")]
    MissingName(String),
    /// The host portion was empty.
    #[error("missing host in '{0}'")]
    MissingHost(String),
    /// No terminal `:port` segment was found.
    #[error("can't bind without port in '{0}'")]
    MissingPort(String),
    /// The port token was not an integer.
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    /// The port was an integer outside `0..=65535`.
    #[error("port '{0}' is outside 0..=65535")]
    PortOutOfRange(String),
    /// Port `0` was requested without a registry to announce the bound port.
    #[error("port 0 in '{0}' requires a configured registry")]
    EphemeralWithoutRegistry(String),
}
