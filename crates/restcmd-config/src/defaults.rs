//! Default values shared by the configuration layer and the relay daemon.
//!
//! Flags and `RESTCMD_*` variables override the user-facing ones; the size
//! limits and grace periods are fixed.
//!
//! ```
//! use restcmd_config::RelayConfig;
//! use restcmd_config::defaults::{DEFAULT_APP_NAME, DEFAULT_THREADS, DEFAULT_URI};
//!
//! let config = RelayConfig::default();
//! assert_eq!(config.uri, DEFAULT_URI);
//! assert_eq!(config.app_name, DEFAULT_APP_NAME);
//! assert_eq!(config.threads, DEFAULT_THREADS);
//! ```

use std::time::Duration;

use crate::options::{LaunchPolicy, LogFormat};

/// Default connection string for the command endpoint.
pub const DEFAULT_URI: &str = "rest://localhost:12345";

/// Default application name used in registrations and replies.
pub const DEFAULT_APP_NAME: &str = "restcmd";

/// Default number of HTTP worker threads.
pub const DEFAULT_THREADS: usize = 1;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Largest accepted command body (15 MiB).
pub const MAX_REQUEST_BYTES: usize = 15 * 1024 * 1024;

/// Largest reply body sent back to a caller (1 MiB).
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Idle back-off used by the reply drain worker.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout applied to each outbound reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period granted to in-flight work during shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Data type announced for the control connection.
pub const CONTROL_DATA_TYPE: &str = "RunControlMessage";

/// Default launch policy for accepted commands.
#[must_use]
pub const fn default_launch_policy() -> LaunchPolicy {
    LaunchPolicy::Spawn
}

/// Default logging format for the daemon.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
