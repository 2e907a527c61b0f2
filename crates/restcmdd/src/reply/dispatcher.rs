//! Reply dispatcher backed by an async HTTP client on a private runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::runtime::{self, Runtime};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use restcmd_config::defaults::{DEFAULT_REPLY_TIMEOUT, DEFAULT_SHUTDOWN_GRACE, MAX_RESPONSE_BYTES};

use crate::dispatch::CommandReply;

use super::{REPLY_TARGET, ReplyError};

const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Tuning for outbound replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOptions {
    /// Timeout for a single reply POST.
    pub request_timeout: Duration,
    /// Largest serialised reply body in bytes.
    pub max_body_bytes: usize,
    /// Time `shutdown` waits for in-flight replies before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REPLY_TIMEOUT,
            max_body_bytes: MAX_RESPONSE_BYTES,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Posts command replies to their callers without blocking the caller.
///
/// The dispatcher owns a single-worker runtime. Every send is tracked, so
/// [`ReplyDispatcher::shutdown`] can wait for stragglers and then abort them
/// before the client is dropped.
pub struct ReplyDispatcher {
    runtime: Mutex<Option<Runtime>>,
    client: reqwest::Client,
    tracker: TaskTracker,
    options: ReplyOptions,
    attempts: Arc<AtomicU64>,
}

impl ReplyDispatcher {
    /// Builds the dispatcher runtime and HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Runtime`] or [`ReplyError::Client`] when either
    /// cannot be constructed.
    pub fn new(options: ReplyOptions) -> Result<Self, ReplyError> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("restcmd-reply")
            .enable_all()
            .build()
            .map_err(|source| ReplyError::Runtime { source })?;
        let client = {
            let _entered = runtime.enter();
            reqwest::Client::builder()
                .timeout(options.request_timeout)
                .build()
                .map_err(|source| ReplyError::Client { source })?
        };
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            client,
            tracker: TaskTracker::new(),
            options,
            attempts: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Queues `reply` for delivery to its attached route.
    ///
    /// The route and any routing keys are stripped before the body is
    /// serialised. Returns once the send is scheduled; its outcome is only
    /// logged.
    ///
    /// # Errors
    ///
    /// Fails without sending when the reply has no route, cannot be
    /// serialised, exceeds the body limit, or the dispatcher is shut down.
    pub fn deliver(&self, mut reply: CommandReply) -> Result<(), ReplyError> {
        let command_id = reply.command_id().unwrap_or_default().to_owned();
        let route = reply.detach_route().ok_or_else(|| ReplyError::NoRoute {
            command_id: command_id.clone(),
        })?;
        let body = reply.to_body().map_err(|source| ReplyError::Serialise {
            command_id: command_id.clone(),
            source,
        })?;
        if body.len() > self.options.max_body_bytes {
            return Err(ReplyError::TooLarge {
                command_id,
                size: body.len(),
                limit: self.options.max_body_bytes,
            });
        }

        let url = route.reply_url();
        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let attempts = Arc::clone(&self.attempts);

        let slot = self.runtime();
        let Some(runtime) = slot.as_ref() else {
            return Err(ReplyError::Closed);
        };
        self.tracker.spawn_on(
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        info!(
                            target: REPLY_TARGET,
                            command_id = %command_id,
                            url = %url,
                            status = response.status().as_u16(),
                            "reply delivered"
                        );
                    }
                    Ok(response) => {
                        warn!(
                            target: REPLY_TARGET,
                            command_id = %command_id,
                            url = %url,
                            status = response.status().as_u16(),
                            "reply refused by caller"
                        );
                    }
                    Err(error) => {
                        warn!(
                            target: REPLY_TARGET,
                            command_id = %command_id,
                            url = %url,
                            error = %error,
                            "reply delivery failed"
                        );
                    }
                }
            },
            runtime.handle(),
        );
        Ok(())
    }

    /// Replies scheduled but not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Delivery attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns true once [`ReplyDispatcher::shutdown`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.runtime().is_none()
    }

    /// Waits up to the grace period for in-flight replies, then aborts the
    /// rest and tears down the runtime. Later calls do nothing.
    ///
    /// Safe to call from a thread that is already driving a Tokio runtime:
    /// the wait then runs on a helper thread and the private runtime is
    /// released in the background.
    pub fn shutdown(&self) {
        let Some(runtime) = self.runtime().take() else {
            return;
        };
        self.tracker.close();
        let grace = self.options.shutdown_grace;
        let wait = || {
            runtime.block_on(async {
                tokio::time::timeout(grace, self.tracker.wait())
                    .await
                    .is_ok()
            })
        };
        // `block_on` panics on a thread that already runs async code.
        let inside_runtime = runtime::Handle::try_current().is_ok();
        let drained = if inside_runtime {
            thread::scope(|scope| scope.spawn(wait).join()).unwrap_or(false)
        } else {
            wait()
        };
        if drained {
            debug!(target: REPLY_TARGET, "reply dispatcher drained");
        } else {
            warn!(
                target: REPLY_TARGET,
                abandoned = self.tracker.len(),
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "aborting replies still in flight"
            );
        }
        if inside_runtime {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
        }
    }

    fn runtime(&self) -> MutexGuard<'_, Option<Runtime>> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ReplyDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ReplyDispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReplyDispatcher")
            .field("options", &self.options)
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
