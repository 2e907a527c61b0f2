//! HTTP listener for inbound commands.
//!
//! The transport module binds the configured endpoint, serves `POST /command`
//! on a dedicated runtime and hands every accepted command to a
//! [`CommandSink`] without waiting for it to be processed.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::{ListenerError, RequestRejection};
pub use self::handler::{ANSWER_HOST_HEADER, ANSWER_PORT_HEADER, COMMAND_PATH, CommandSink};
pub use self::listener::{CommandListener, ListenerOptions};
#[cfg(test)]
pub(crate) use self::test_utils::RecordingSink;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
