//! Asynchronous command dispatch.
//!
//! Accepted commands are handed to a [`DispatchExecutor`], which runs the
//! injected [`CommandProcessor`] away from the HTTP worker pool under the
//! configured launch policy and returns a [`PendingResult`]. Pending results
//! wait in the unordered [`ResultQueue`] until the drain worker resolves them
//! and hands the replies to the reply dispatcher.
//!
//! ## Reply shape
//!
//! ```json
//! {"success":true,"result":"OK","appname":"restcmd","data":{"cmdid":"start"}}
//! ```
//!
//! Replies complete in any order; correlation relies on `data.cmdid` and on
//! the route carried with every pending result.

mod command;
mod executor;
mod pending;
mod processor;
mod queue;

pub use self::command::{
    COMMAND_ID_KEY, CommandEnvelope, CommandReply, REPLY_PATH, ROUTING_KEYS, ReplyRoute,
};
pub use self::executor::DispatchExecutor;
pub use self::pending::PendingResult;
pub use self::processor::{CommandProcessor, ProcessError};
pub use self::queue::ResultQueue;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
