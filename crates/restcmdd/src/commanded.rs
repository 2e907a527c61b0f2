//! Demonstration processor that counts executed commands.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatch::{CommandProcessor, CommandReply, ProcessError};

const COMMANDED_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::commanded");

/// Processor that acknowledges every command with `OK` and counts them.
///
/// Commands whose `id` is listed as rejected fail instead, which makes the
/// failure path observable end to end.
#[derive(Debug, Default)]
pub struct CountingProcessor {
    executed: AtomicU64,
    rejected: HashSet<String>,
}

impl CountingProcessor {
    /// Builds a processor that fails the given command ids.
    pub fn new<I, S>(rejected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executed: AtomicU64::new(0),
            rejected: rejected.into_iter().map(Into::into).collect(),
        }
    }

    /// Commands executed successfully so far.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }

    /// Logs the running total every `period` until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the reporter runtime or thread cannot be
    /// created.
    pub fn spawn_reporter(
        self: &Arc<Self>,
        cancel: CancellationToken,
        period: Duration,
    ) -> io::Result<thread::JoinHandle<()>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let processor = Arc::clone(self);
        thread::Builder::new()
            .name("restcmd-stats".to_owned())
            .spawn(move || {
                runtime.block_on(async move {
                    loop {
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(period) => {
                                info!(
                                    target: COMMANDED_TARGET,
                                    total = processor.executed(),
                                    "total number of commands executed"
                                );
                            }
                        }
                    }
                });
            })
    }
}

impl CommandProcessor for CountingProcessor {
    fn process(&self, command: &Value) -> Result<CommandReply, ProcessError> {
        let id = command.get("id").and_then(Value::as_str).unwrap_or_default();
        if self.rejected.contains(id) {
            return Err(ProcessError::new(format!("command '{id}' rejected")));
        }
        let total = self.executed.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(target: COMMANDED_TARGET, command_id = id, total, "command executed");
        Ok(CommandReply::success("OK"))
    }
}
