//! Out-of-band delivery of command replies.
//!
//! Each reply is posted to `http://{answer_host}:{answer_port}/response` on the
//! dispatcher's own runtime. Delivery is best effort: one attempt, failures
//! logged and dropped.

mod dispatcher;
mod errors;
#[cfg(test)]
mod test_utils;

pub use self::dispatcher::{ReplyDispatcher, ReplyOptions};
pub use self::errors::ReplyError;
#[cfg(test)]
pub(crate) use self::test_utils::{ReplyCollector, unused_port};

const REPLY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reply");
