//! Enumerated relay options shared by the CLI and environment layers.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output format for relay logs.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers.
    #[default]
    Json,
    /// Single-line human-readable events.
    Compact,
}

/// How accepted commands are handed to the command processor.
///
/// `Spawn` runs every command on its own thread as soon as it is accepted, so
/// a slow command never holds up another. `Deferred` postpones processing
/// until the reply worker first waits on the result; the worker then runs it
/// inline, which serialises processing and lets one slow command delay every
/// reply queued behind it. Prefer `Spawn` outside of tests and debugging.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LaunchPolicy {
    /// Start a background task per command immediately.
    #[default]
    Spawn,
    /// Run the command when its result is first awaited.
    Deferred,
}
