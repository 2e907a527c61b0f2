//! HTTP listener serving the command route on its own runtime.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use tokio::net::{TcpListener, TcpSocket};
use tokio::runtime::{self, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use restcmd_config::EndpointAddress;
use restcmd_config::defaults::{DEFAULT_THREADS, MAX_REQUEST_BYTES};

use super::handler::{COMMAND_PATH, SharedSink, accept_command};
use super::{CommandSink, LISTENER_TARGET, ListenerError};

const LISTEN_BACKLOG: u32 = 1024;
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Tuning applied when the listener is initialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerOptions {
    /// HTTP worker threads in the listener runtime.
    pub threads: usize,
    /// Largest accepted request body in bytes.
    pub max_request_bytes: usize,
    /// Sets `SO_REUSEADDR` on the listening socket.
    pub reuse_address: bool,
    /// Sets `SO_REUSEPORT` on the listening socket where supported.
    pub reuse_port: bool,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            max_request_bytes: MAX_REQUEST_BYTES,
            reuse_address: true,
            reuse_port: true,
        }
    }
}

/// Listener for `POST /command`.
///
/// Lifecycle is `init`, `start`, then `stop` or `shutdown`. Serving happens on
/// a dedicated thread that owns a multi-thread runtime, so `start` returns as
/// soon as the socket is bound.
pub struct CommandListener {
    address: EndpointAddress,
    sink: SharedSink,
    prepared: Option<Prepared>,
    cancel: CancellationToken,
    local_addr: Option<SocketAddr>,
    handle: Option<thread::JoinHandle<()>>,
}

struct Prepared {
    options: ListenerOptions,
    router: Router,
}

impl CommandListener {
    /// Creates a listener for `address` that forwards commands to `sink`.
    pub fn new(address: EndpointAddress, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            address,
            sink,
            prepared: None,
            cancel: CancellationToken::new(),
            local_addr: None,
            handle: None,
        }
    }

    /// Applies `options` and registers the command route.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ZeroThreads`] when no worker threads are
    /// requested.
    pub fn init(&mut self, options: ListenerOptions) -> Result<(), ListenerError> {
        if options.threads == 0 {
            return Err(ListenerError::ZeroThreads);
        }
        let router = Router::new()
            .route(COMMAND_PATH, post(accept_command))
            .layer(DefaultBodyLimit::max(options.max_request_bytes))
            .with_state(Arc::clone(&self.sink));
        self.prepared = Some(Prepared { options, router });
        Ok(())
    }

    /// Binds the socket and starts serving in the background.
    ///
    /// Returns the bound address, which carries the OS-chosen port when the
    /// configured port is 0.
    ///
    /// # Errors
    ///
    /// Fails when the listener was not initialised, is already running, or
    /// the runtime, address resolution, bind or thread spawn fails.
    pub fn start(&mut self) -> Result<SocketAddr, ListenerError> {
        if let (Some(addr), Some(_)) = (self.local_addr, self.handle.as_ref()) {
            return Err(ListenerError::AlreadyStarted { addr });
        }
        let Prepared { options, router } = self
            .prepared
            .as_ref()
            .ok_or(ListenerError::NotInitialised)?;

        let runtime = build_runtime(options.threads)?;
        let target = resolve(self.address.host(), self.address.port())?;
        let listener = {
            let _entered = runtime.enter();
            bind(target, options)?
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind {
                addr: target,
                source,
            })?;

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let router = router.clone();
        let handle = thread::Builder::new()
            .name("restcmd-listener".to_owned())
            .spawn(move || serve(runtime, listener, router, cancel, local_addr))
            .map_err(|source| ListenerError::ThreadSpawn { source })?;

        info!(
            target: LISTENER_TARGET,
            endpoint = %self.address,
            local_addr = %local_addr,
            threads = options.threads,
            "command listener active"
        );
        self.local_addr = Some(local_addr);
        self.handle = Some(handle);
        Ok(local_addr)
    }

    /// Address the listener is bound to, once started.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Configured endpoint.
    #[must_use]
    pub const fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Returns true while the serving thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Asks the serving thread to stop accepting connections.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stops serving, drains in-flight connections and joins the thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the serving thread
    /// panicked.
    pub fn shutdown(&mut self) -> Result<(), ListenerError> {
        self.stop();
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle.join().map_err(|_| ListenerError::ThreadPanic)
    }
}

impl Drop for CommandListener {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            warn!(
                target: LISTENER_TARGET,
                error = %error,
                "command listener shutdown failed"
            );
        }
    }
}

fn build_runtime(threads: usize) -> Result<Runtime, ListenerError> {
    runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .thread_name("restcmd-http")
        .enable_all()
        .build()
        .map_err(|source| ListenerError::Runtime { source })
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })
}

fn bind(addr: SocketAddr, options: &ListenerOptions) -> Result<TcpListener, ListenerError> {
    let bind_error = |source: io::Error| ListenerError::Bind { addr, source };
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(bind_error)?;
    socket
        .set_reuseaddr(options.reuse_address)
        .map_err(bind_error)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuseport(options.reuse_port).map_err(bind_error)?;
    socket.bind(addr).map_err(bind_error)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_error)
}

fn serve(
    runtime: Runtime,
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
    local_addr: SocketAddr,
) {
    let service = router.into_make_service_with_connect_info::<SocketAddr>();
    let outcome = runtime.block_on(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
    });
    if let Err(error) = outcome {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            local_addr = %local_addr,
            "command listener stopped with an error"
        );
    }
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    debug!(target: LISTENER_TARGET, local_addr = %local_addr, "command listener stopped");
}
