//! Handles for command results that may not exist yet.

use std::fmt;
use std::sync::mpsc::{Receiver, TryRecvError};

use super::command::{CommandReply, ReplyRoute};

const LOST_REPLY_MESSAGE: &str = "command task ended without producing a reply";

/// Deferred command body, run by whoever first waits on the result.
pub(crate) type DeferredTask = Box<dyn FnOnce() -> CommandReply + Send + 'static>;

/// Reply for one accepted command that may still be in progress.
///
/// Every resolution path yields a reply with the caller's route attached, so
/// a command whose task vanished still produces a failed reply to deliver.
pub struct PendingResult {
    command_id: String,
    route: ReplyRoute,
    state: PendingState,
}

enum PendingState {
    Running(Receiver<CommandReply>),
    Deferred(DeferredTask),
    Ready(CommandReply),
}

impl PendingResult {
    pub(crate) const fn running(
        command_id: String,
        route: ReplyRoute,
        receiver: Receiver<CommandReply>,
    ) -> Self {
        Self {
            command_id,
            route,
            state: PendingState::Running(receiver),
        }
    }

    pub(crate) fn deferred(command_id: String, route: ReplyRoute, task: DeferredTask) -> Self {
        Self {
            command_id,
            route,
            state: PendingState::Deferred(task),
        }
    }

    pub(crate) const fn ready(command_id: String, route: ReplyRoute, reply: CommandReply) -> Self {
        Self {
            command_id,
            route,
            state: PendingState::Ready(reply),
        }
    }

    /// Identifier of the originating command.
    #[must_use]
    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    /// Route the reply will be delivered to.
    #[must_use]
    pub const fn route(&self) -> &ReplyRoute {
        &self.route
    }

    /// Returns true when processing only starts once the result is awaited.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self.state, PendingState::Deferred(_))
    }

    /// Returns the reply if it is available without blocking.
    ///
    /// Deferred results are never ready here; use [`PendingResult::wait`].
    ///
    /// # Errors
    ///
    /// Hands the handle back unchanged when the reply is not ready yet.
    pub fn try_resolve(self) -> Result<CommandReply, Self> {
        let Self {
            command_id,
            route,
            state,
        } = self;
        let reply = match state {
            PendingState::Ready(reply) => reply,
            PendingState::Running(receiver) => match receiver.try_recv() {
                Ok(reply) => reply,
                Err(TryRecvError::Empty) => {
                    return Err(Self::running(command_id, route, receiver));
                }
                Err(TryRecvError::Disconnected) => lost_reply(&command_id),
            },
            PendingState::Deferred(task) => return Err(Self::deferred(command_id, route, task)),
        };
        Ok(reply.with_route(route))
    }

    /// Blocks until the reply exists, running a deferred command inline.
    #[must_use]
    pub fn wait(self) -> CommandReply {
        let Self {
            command_id,
            route,
            state,
        } = self;
        let reply = match state {
            PendingState::Ready(reply) => reply,
            PendingState::Running(receiver) => receiver
                .recv()
                .unwrap_or_else(|_| lost_reply(&command_id)),
            PendingState::Deferred(task) => task(),
        };
        reply.with_route(route)
    }
}

fn lost_reply(command_id: &str) -> CommandReply {
    CommandReply::failure(LOST_REPLY_MESSAGE).with_command_id(command_id)
}

impl fmt::Debug for PendingResult {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            PendingState::Running(_) => "running",
            PendingState::Deferred(_) => "deferred",
            PendingState::Ready(_) => "ready",
        };
        formatter
            .debug_struct("PendingResult")
            .field("command_id", &self.command_id)
            .field("route", &self.route)
            .field("state", &state)
            .finish()
    }
}
