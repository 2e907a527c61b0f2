//! Command-line and environment configuration for the relay daemon.
//!
//! Every option can be given as a flag or through a `RESTCMD_*` environment
//! variable; flags take precedence. Validation is split from parsing so the
//! daemon can report configuration errors before anything is bound.

use std::ffi::OsString;

use clap::Parser;
use thiserror::Error;
use url::Url;

use crate::defaults::{
    DEFAULT_APP_NAME, DEFAULT_LOG_FILTER, DEFAULT_THREADS, DEFAULT_URI, default_launch_policy,
    default_log_format,
};
use crate::endpoint::{EndpointAddress, MalformedUri, PortPolicy};
use crate::options::{LaunchPolicy, LogFormat};

/// Resolved relay configuration.
#[derive(Debug, Clone, Parser, PartialEq, Eq)]
#[command(
    name = "restcmdd",
    about = "Relays HTTP commands to a command processor and posts replies back"
)]
pub struct RelayConfig {
    /// Endpoint connection string, `scheme://[name@]host:port`.
    #[arg(long, env = "RESTCMD_URI", default_value = DEFAULT_URI)]
    pub uri: String,
    /// Application name used for the registry id and reply metadata.
    #[arg(long = "app-name", env = "RESTCMD_APP_NAME", default_value = DEFAULT_APP_NAME)]
    pub app_name: String,
    /// Number of HTTP worker threads.
    #[arg(long, env = "RESTCMD_THREADS", default_value_t = DEFAULT_THREADS)]
    pub threads: usize,
    /// How accepted commands are handed to the processor.
    #[arg(
        long = "launch-policy",
        env = "RESTCMD_LAUNCH_POLICY",
        default_value_t = default_launch_policy()
    )]
    pub launch_policy: LaunchPolicy,
    /// Base URL of the connectivity service used to announce the endpoint.
    #[arg(long = "registry-url", env = "RESTCMD_REGISTRY_URL")]
    pub registry_url: Option<Url>,
    /// Session (partition) name used with the connectivity service.
    #[arg(long, env = "RESTCMD_SESSION")]
    pub session: Option<String>,
    /// Command ids the demo processor fails deliberately.
    #[arg(long = "reject", env = "RESTCMD_REJECT", value_delimiter = ',')]
    pub rejected_commands: Vec<String>,
    /// `tracing` filter expression.
    #[arg(long = "log-filter", env = "RESTCMD_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
    /// Log output format.
    #[arg(
        long = "log-format",
        env = "RESTCMD_LOG_FORMAT",
        default_value_t = default_log_format()
    )]
    pub log_format: LogFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_owned(),
            app_name: DEFAULT_APP_NAME.to_owned(),
            threads: DEFAULT_THREADS,
            launch_policy: default_launch_policy(),
            registry_url: None,
            session: None,
            rejected_commands: Vec::new(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
        }
    }
}

/// Connectivity-service settings extracted from [`RelayConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Base URL of the service.
    pub url: Url,
    /// Session (partition) the endpoint is announced in.
    pub session: String,
}

impl RelayConfig {
    /// Parses configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the `clap` error for unknown flags or unparsable values,
    /// including the help and version pseudo-errors.
    pub fn load() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    /// Parses configuration from an explicit argument list.
    ///
    /// # Errors
    ///
    /// See [`RelayConfig::load`].
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Parses the endpoint, permitting port `0` only when a registry is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Uri`] when the connection string is malformed.
    pub fn endpoint(&self) -> Result<EndpointAddress, ConfigError> {
        let policy = if self.registry_url.is_some() {
            PortPolicy::AllowEphemeral
        } else {
            PortPolicy::FixedOnly
        };
        Ok(EndpointAddress::parse(&self.uri, policy)?)
    }

    /// Returns the registry settings when a registry URL is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSession`] when a registry URL is set
    /// without a session.
    pub fn registry(&self) -> Result<Option<RegistrySettings>, ConfigError> {
        let Some(url) = self.registry_url.clone() else {
            return Ok(None);
        };
        let session = self
            .session
            .clone()
            .filter(|session| !session.trim().is_empty())
            .ok_or(ConfigError::MissingSession)?;
        Ok(Some(RegistrySettings { url, session }))
    }

    /// Checks every derived setting so failures surface before binding.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::MissingAppName);
        }
        self.endpoint()?;
        self.registry()?;
        Ok(())
    }
}

/// Errors raised while validating [`RelayConfig`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The endpoint connection string was malformed.
    #[error(transparent)]
    Uri(#[from] MalformedUri),
    /// A registry URL was configured without a session name.
    #[error("a registry URL requires a session (RESTCMD_SESSION)")]
    MissingSession,
    /// The HTTP worker pool would be empty.
    #[error("at least one HTTP worker thread is required")]
    ZeroThreads,
    /// The application name was blank.
    #[error("the application name must not be empty")]
    MissingAppName,
}
