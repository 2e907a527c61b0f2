//! Launches command processing away from the HTTP worker pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;

use serde_json::Value;
use tracing::{debug, error, warn};

use restcmd_config::LaunchPolicy;

use super::DISPATCH_TARGET;
use super::command::{CommandEnvelope, CommandReply};
use super::pending::PendingResult;
use super::processor::CommandProcessor;

/// Runs the injected [`CommandProcessor`] under a [`LaunchPolicy`].
///
/// Processor errors and panics never escape: both become failed replies that
/// are delivered to the caller like any other result.
pub struct DispatchExecutor {
    processor: Arc<dyn CommandProcessor>,
    policy: LaunchPolicy,
    app_name: Arc<str>,
    launched: AtomicU64,
}

impl DispatchExecutor {
    /// Builds an executor for `processor`.
    pub fn new(processor: Arc<dyn CommandProcessor>, policy: LaunchPolicy, app_name: &str) -> Self {
        Self {
            processor,
            policy,
            app_name: Arc::from(app_name),
            launched: AtomicU64::new(0),
        }
    }

    /// Configured launch policy.
    #[must_use]
    pub const fn policy(&self) -> LaunchPolicy {
        self.policy
    }

    /// Number of commands launched so far.
    #[must_use]
    pub fn launched(&self) -> u64 {
        self.launched.load(Ordering::Relaxed)
    }

    /// Hands `envelope` to the processor and returns its pending result.
    pub fn launch(&self, envelope: CommandEnvelope) -> PendingResult {
        let sequence = self.launched.fetch_add(1, Ordering::Relaxed);
        let command_id = envelope.command_id();
        let (command, route) = envelope.into_parts();
        let job = CommandJob {
            processor: Arc::clone(&self.processor),
            app_name: Arc::clone(&self.app_name),
            command_id: command_id.clone(),
            command,
        };

        match self.policy {
            LaunchPolicy::Deferred => {
                debug!(target: DISPATCH_TARGET, command_id = %command_id, "deferring command");
                PendingResult::deferred(command_id, route, Box::new(move || job.run()))
            }
            LaunchPolicy::Spawn => {
                let (sender, receiver) = mpsc::channel();
                let spawned = thread::Builder::new()
                    .name(format!("restcmd-cmd-{sequence}"))
                    .spawn(move || {
                        let reply = job.run();
                        if sender.send(reply).is_err() {
                            debug!(target: DISPATCH_TARGET, "pending result dropped before reply");
                        }
                    });
                match spawned {
                    Ok(_) => {
                        debug!(target: DISPATCH_TARGET, command_id = %command_id, sequence, "command launched");
                        PendingResult::running(command_id, route, receiver)
                    }
                    Err(spawn_error) => {
                        error!(
                            target: DISPATCH_TARGET,
                            command_id = %command_id,
                            error = %spawn_error,
                            "failed to spawn command task"
                        );
                        let reply = CommandReply::failure(format!(
                            "failed to start command task: {spawn_error}"
                        ))
                        .with_default_app_name(&self.app_name)
                        .with_command_id(&command_id);
                        PendingResult::ready(command_id, route, reply)
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for DispatchExecutor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DispatchExecutor")
            .field("policy", &self.policy)
            .field("app_name", &self.app_name)
            .field("launched", &self.launched())
            .finish_non_exhaustive()
    }
}

struct CommandJob {
    processor: Arc<dyn CommandProcessor>,
    app_name: Arc<str>,
    command_id: String,
    command: Value,
}

impl CommandJob {
    fn run(self) -> CommandReply {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.processor.process(&self.command)));
        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(process_error)) => {
                warn!(
                    target: DISPATCH_TARGET,
                    command_id = %self.command_id,
                    error = %process_error,
                    "command processing failed"
                );
                CommandReply::failure(process_error.message())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    target: DISPATCH_TARGET,
                    command_id = %self.command_id,
                    panic = message,
                    "command processor panicked"
                );
                CommandReply::failure(format!("command processor panicked: {message}"))
            }
        };
        reply
            .with_default_app_name(&self.app_name)
            .with_command_id(&self.command_id)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
