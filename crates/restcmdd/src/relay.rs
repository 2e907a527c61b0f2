//! Command relay: listener, dispatch, reply delivery and registry wiring.
//!
//! [`CommandRelay`] owns one instance of each moving part:
//!
//! * the [`CommandListener`] that acknowledges `POST /command` requests;
//! * a [`DispatchExecutor`] that launches the processor for each command and
//!   pushes its [`PendingResult`] onto a shared [`ResultQueue`];
//! * a drain worker thread that resolves pending results in whatever order
//!   they finish and hands replies to the [`ReplyDispatcher`];
//! * an optional [`RegistryAnnouncer`] that publishes the bound endpoint.
//!
//! Shutdown runs in reverse: retract, stop accepting, drain what was already
//! accepted within the grace period, then close the reply client.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use restcmd_config::defaults::{DEFAULT_APP_NAME, DEFAULT_DRAIN_INTERVAL, DEFAULT_SHUTDOWN_GRACE};
use restcmd_config::{EndpointAddress, LaunchPolicy, MalformedUri, PortPolicy, RelayConfig};

use crate::dispatch::{
    CommandEnvelope, CommandProcessor, CommandReply, DispatchExecutor, PendingResult, ResultQueue,
};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::registry::{ConnectionRegistry, RegistryAnnouncer, RegistryError};
use crate::reply::{ReplyDispatcher, ReplyError, ReplyOptions};
use crate::transport::{CommandListener, CommandSink, ListenerError, ListenerOptions};

const RELAY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::relay");
const UNFINISHED_POLL: Duration = Duration::from_millis(10);

/// Tuning for a [`CommandRelay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Application name used in replies and the registry id.
    pub app_name: String,
    /// How commands are handed to the processor.
    pub launch_policy: LaunchPolicy,
    /// Listener tuning.
    pub listener: ListenerOptions,
    /// Reply client tuning.
    pub reply: ReplyOptions,
    /// Longest idle wait of the drain worker.
    pub drain_interval: Duration,
    /// Time granted to already accepted commands during shutdown.
    pub shutdown_grace: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_owned(),
            launch_policy: LaunchPolicy::default(),
            listener: ListenerOptions::default(),
            reply: ReplyOptions::default(),
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl RelaySettings {
    /// Settings derived from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            launch_policy: config.launch_policy,
            listener: ListenerOptions {
                threads: config.threads,
                ..ListenerOptions::default()
            },
            ..Self::default()
        }
    }
}

/// Errors surfaced by the relay lifecycle.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The connection string was rejected.
    #[error("invalid relay endpoint: {source}")]
    Configuration {
        #[source]
        source: MalformedUri,
    },
    /// The listener could not be prepared, started or joined.
    #[error("command listener failed: {source}")]
    Listener {
        #[source]
        source: ListenerError,
    },
    /// The reply client could not be built.
    #[error("reply dispatcher failed: {source}")]
    Reply {
        #[source]
        source: ReplyError,
    },
    /// The local address could not be resolved for the announcement.
    #[error("failed to announce command endpoint: {source}")]
    Announce {
        #[source]
        source: RegistryError,
    },
    /// The drain worker thread could not be spawned.
    #[error("failed to spawn reply drain worker: {source}")]
    Worker {
        #[source]
        source: io::Error,
    },
    /// The drain worker thread panicked.
    #[error("reply drain worker panicked")]
    WorkerPanic,
    /// The relay was already shut down and cannot restart.
    #[error("relay has been shut down")]
    ShutDown,
}

impl From<MalformedUri> for RelayError {
    fn from(source: MalformedUri) -> Self {
        Self::Configuration { source }
    }
}

impl From<ListenerError> for RelayError {
    fn from(source: ListenerError) -> Self {
        Self::Listener { source }
    }
}

impl From<ReplyError> for RelayError {
    fn from(source: ReplyError) -> Self {
        Self::Reply { source }
    }
}

/// HTTP command relay with asynchronous processing and out-of-band replies.
pub struct CommandRelay {
    address: EndpointAddress,
    listener: CommandListener,
    executor: Arc<DispatchExecutor>,
    queue: Arc<ResultQueue>,
    replies: Arc<ReplyDispatcher>,
    announcer: Option<RegistryAnnouncer>,
    reporter: Arc<dyn HealthReporter>,
    settings: RelaySettings,
    cancel: CancellationToken,
    drain: Option<thread::JoinHandle<()>>,
    shut_down: bool,
}

impl CommandRelay {
    /// Builds a relay for an already validated endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Reply`] when the reply client cannot be built.
    pub fn new(
        address: EndpointAddress,
        processor: Arc<dyn CommandProcessor>,
        settings: RelaySettings,
    ) -> Result<Self, RelayError> {
        let executor = Arc::new(DispatchExecutor::new(
            processor,
            settings.launch_policy,
            &settings.app_name,
        ));
        let queue = Arc::new(ResultQueue::new());
        let replies = Arc::new(ReplyDispatcher::new(settings.reply.clone())?);
        let sink = Arc::new(RelaySink {
            executor: Arc::clone(&executor),
            queue: Arc::clone(&queue),
        });
        let listener = CommandListener::new(address.clone(), sink);
        Ok(Self {
            address,
            listener,
            executor,
            queue,
            replies,
            announcer: None,
            reporter: Arc::new(StructuredHealthReporter::new()),
            settings,
            cancel: CancellationToken::new(),
            drain: None,
            shut_down: false,
        })
    }

    /// Parses `uri` and builds a relay, announcing through `registry` when
    /// one is given. Port `0` is only accepted together with a registry.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] for a malformed connection
    /// string; nothing is bound in that case.
    pub fn from_uri(
        uri: &str,
        processor: Arc<dyn CommandProcessor>,
        settings: RelaySettings,
        registry: Option<Arc<dyn ConnectionRegistry>>,
    ) -> Result<Self, RelayError> {
        let policy = if registry.is_some() {
            PortPolicy::AllowEphemeral
        } else {
            PortPolicy::FixedOnly
        };
        let address = EndpointAddress::parse(uri, policy)?;
        let relay = Self::new(address, processor, settings)?;
        Ok(match registry {
            Some(registry) => relay.with_registry(registry),
            None => relay,
        })
    }

    /// Announces the bound endpoint through `registry` on start.
    #[must_use]
    pub fn with_registry(self, registry: Arc<dyn ConnectionRegistry>) -> Self {
        let announcer =
            RegistryAnnouncer::new(registry, &self.settings.app_name, self.address.scheme());
        self.with_announcer(announcer)
    }

    /// Uses a preconfigured announcer.
    #[must_use]
    pub fn with_announcer(mut self, announcer: RegistryAnnouncer) -> Self {
        self.announcer = Some(announcer);
        self
    }

    /// Routes lifecycle events to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Prepares the listener with the configured options.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Listener`] for unusable listener options.
    pub fn init(&mut self) -> Result<(), RelayError> {
        self.listener.init(self.settings.listener.clone())?;
        Ok(())
    }

    /// Binds, starts serving, starts the drain worker and announces the
    /// endpoint. Returns the bound address.
    ///
    /// On failure everything already started is shut down again before the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Fails when the relay was shut down, the listener cannot start, the
    /// drain worker cannot be spawned or the local address cannot be
    /// resolved for the announcement.
    pub fn start(&mut self) -> Result<SocketAddr, RelayError> {
        if self.shut_down {
            return Err(RelayError::ShutDown);
        }
        if let (Some(addr), Some(_)) = (self.local_addr(), self.drain.as_ref()) {
            return Err(ListenerError::AlreadyStarted { addr }.into());
        }
        self.reporter.relay_starting(&self.address);
        match self.start_components() {
            Ok(local_addr) => {
                self.reporter.relay_started(&self.address, local_addr);
                Ok(local_addr)
            }
            Err(error) => {
                self.reporter.relay_failed(&error);
                if let Err(cleanup) = self.shutdown() {
                    warn!(
                        target: RELAY_TARGET,
                        error = %cleanup,
                        "cleanup after failed start did not complete"
                    );
                }
                Err(error)
            }
        }
    }

    fn start_components(&mut self) -> Result<SocketAddr, RelayError> {
        let local_addr = self.listener.start()?;
        if self.drain.is_none() {
            self.spawn_drain_worker()?;
        }
        if let Some(announcer) = &self.announcer {
            let registration = announcer
                .announce(local_addr.port())
                .map_err(|source| RelayError::Announce { source })?;
            self.reporter.endpoint_announced(&registration);
        }
        Ok(local_addr)
    }

    fn spawn_drain_worker(&mut self) -> Result<(), RelayError> {
        self.cancel = CancellationToken::new();
        let worker = DrainWorker {
            queue: Arc::clone(&self.queue),
            replies: Arc::clone(&self.replies),
            cancel: self.cancel.clone(),
            interval: self.settings.drain_interval,
            grace: self.settings.shutdown_grace,
        };
        let handle = thread::Builder::new()
            .name("restcmd-drain".to_owned())
            .spawn(move || worker.run())
            .map_err(|source| RelayError::Worker { source })?;
        self.drain = Some(handle);
        Ok(())
    }

    /// Stops accepting new commands without waiting.
    pub fn stop(&self) {
        self.listener.stop();
    }

    /// Retracts the announcement, stops the listener, delivers replies for
    /// already accepted commands within the grace period and closes the reply
    /// client. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Reports a panicked listener or drain thread after every step has run.
    pub fn shutdown(&mut self) -> Result<(), RelayError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.reporter.relay_stopping();

        if let Some(announcer) = &self.announcer {
            announcer.withdraw();
        }
        let listener = self.listener.shutdown().map_err(RelayError::from);
        self.cancel.cancel();
        let worker = match self.drain.take() {
            Some(handle) => handle.join().map_err(|_| RelayError::WorkerPanic),
            None => Ok(()),
        };
        self.replies.shutdown();

        self.reporter.relay_stopped();
        listener.and(worker)
    }

    /// Address the listener is bound to, once started.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Configured endpoint.
    #[must_use]
    pub const fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Commands accepted and launched so far.
    #[must_use]
    pub fn commands_launched(&self) -> u64 {
        self.executor.launched()
    }

    /// Pending results not yet handed to the reply client.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.queue.len()
    }

    /// Reply deliveries attempted so far.
    #[must_use]
    pub fn reply_attempts(&self) -> u64 {
        self.replies.attempts()
    }
}

impl Drop for CommandRelay {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            warn!(target: RELAY_TARGET, error = %error, "relay shutdown failed");
        }
    }
}

impl std::fmt::Debug for CommandRelay {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CommandRelay")
            .field("address", &self.address)
            .field("local_addr", &self.local_addr())
            .field("settings", &self.settings)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

struct RelaySink {
    executor: Arc<DispatchExecutor>,
    queue: Arc<ResultQueue>,
}

impl CommandSink for RelaySink {
    fn submit(&self, envelope: CommandEnvelope) {
        self.queue.push(self.executor.launch(envelope));
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DrainPass {
    delivered: usize,
    unfinished: usize,
}

struct DrainWorker {
    queue: Arc<ResultQueue>,
    replies: Arc<ReplyDispatcher>,
    cancel: CancellationToken,
    interval: Duration,
    grace: Duration,
}

impl DrainWorker {
    fn run(self) {
        debug!(target: RELAY_TARGET, "reply drain worker started");
        while !self.cancel.is_cancelled() {
            let pass = self.drain_pass();
            if pass.delivered > 0 {
                continue;
            }
            if pass.unfinished == 0 {
                if let Some(pending) = self.queue.pop_timeout(self.interval)
                    && let Err(pending) = self.settle(pending)
                {
                    self.queue.push(pending);
                }
            } else {
                thread::sleep(self.interval.min(UNFINISHED_POLL));
            }
        }
        self.final_drain();
        debug!(target: RELAY_TARGET, "reply drain worker stopped");
    }

    // Each queued handle is visited at most once per pass; unfinished ones
    // go back on the queue afterwards.
    fn drain_pass(&self) -> DrainPass {
        let mut pass = DrainPass::default();
        let mut unfinished = Vec::new();
        for _ in 0..self.queue.len() {
            let Some(pending) = self.queue.try_pop() else {
                break;
            };
            match self.settle(pending) {
                Ok(()) => pass.delivered += 1,
                Err(pending) => unfinished.push(pending),
            }
        }
        pass.unfinished = unfinished.len();
        for pending in unfinished {
            self.queue.push(pending);
        }
        pass
    }

    fn settle(&self, pending: PendingResult) -> Result<(), PendingResult> {
        let reply = if pending.is_deferred() {
            pending.wait()
        } else {
            pending.try_resolve()?
        };
        self.deliver(reply);
        Ok(())
    }

    fn deliver(&self, reply: CommandReply) {
        let command_id = reply.command_id().unwrap_or_default().to_owned();
        if let Err(error) = self.replies.deliver(reply) {
            warn!(
                target: RELAY_TARGET,
                command_id = %command_id,
                error = %error,
                "reply dropped"
            );
        }
    }

    fn final_drain(&self) {
        // A grace too large to represent waits without a deadline.
        let deadline = Instant::now().checked_add(self.grace);
        while !self.queue.is_empty() {
            let pass = self.drain_pass();
            if pass.unfinished == 0 {
                continue;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(
                    target: RELAY_TARGET,
                    abandoned = pass.unfinished,
                    "commands still running after shutdown grace period"
                );
                return;
            }
            thread::sleep(UNFINISHED_POLL);
        }
    }
}
