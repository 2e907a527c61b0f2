//! Loopback HTTP endpoint that captures JSON bodies posted to it.

use std::future::IntoFuture;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::post;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::dispatch::REPLY_PATH;

#[derive(Clone)]
struct CollectorState {
    posts: Arc<Mutex<Vec<(String, Value)>>>,
    delay: Duration,
}

/// Stub caller endpoint running on its own runtime.
///
/// Every POST is recorded with its path; [`ReplyCollector::replies`] returns
/// the bodies posted to the reply path.
pub(crate) struct ReplyCollector {
    addr: SocketAddr,
    posts: Arc<Mutex<Vec<(String, Value)>>>,
    cancel: CancellationToken,
    handle: Option<thread::JoinHandle<()>>,
}

impl ReplyCollector {
    /// Starts a collector that records each reply and answers 200.
    pub(crate) fn start() -> Self {
        Self::spawn(Duration::ZERO)
    }

    /// Starts a collector that records each reply, then sleeps for `delay`
    /// before answering.
    pub(crate) fn stalled(delay: Duration) -> Self {
        Self::spawn(delay)
    }

    fn spawn(delay: Duration) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("collector runtime");
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("bind collector");
        let addr = listener.local_addr().expect("collector address");
        let posts = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/{*path}", post(collect))
            .with_state(CollectorState {
                posts: Arc::clone(&posts),
                delay,
            });
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = thread::spawn(move || {
            runtime.block_on(async move {
                tokio::select! {
                    () = token.cancelled() => {}
                    result = axum::serve(listener, app).into_future() => {
                        result.expect("collector serve");
                    }
                }
            });
            runtime.shutdown_background();
        });
        Self {
            addr,
            posts,
            cancel,
            handle: Some(handle),
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub(crate) fn replies(&self) -> Vec<Value> {
        self.bodies_for(REPLY_PATH)
    }

    pub(crate) fn bodies_for(&self, path: &str) -> Vec<Value> {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(posted_to, _)| posted_to == path)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Polls until at least `count` replies arrived or `timeout` elapsed.
    pub(crate) fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Value> {
        let deadline = Instant::now() + timeout;
        loop {
            let replies = self.replies();
            if replies.len() >= count || Instant::now() >= deadline {
                return replies;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for ReplyCollector {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.join().expect("join collector");
        }
    }
}

async fn collect(State(state): State<CollectorState>, uri: Uri, body: Bytes) -> StatusCode {
    let Ok(document) = serde_json::from_slice::<Value>(&body) else {
        return StatusCode::BAD_REQUEST;
    };
    state
        .posts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push((uri.path().to_owned(), document));
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    StatusCode::OK
}

/// Port with nothing listening on it.
pub(crate) fn unused_port() -> u16 {
    let probe = StdTcpListener::bind("127.0.0.1:0").expect("bind probe");
    probe.local_addr().expect("probe address").port()
}
