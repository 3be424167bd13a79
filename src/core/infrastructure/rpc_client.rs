//! JSON-RPC transport client that talks to the backend over HTTP POST or a
//! persistent WebSocket, behind a single `call` interface.

use crate::{
    ClientConfig, KomariError, KomariResult,
    core::{
        domain::{
            error::{RpcError, RpcResult},
            model::connection_state::TransportEvent,
            value_object::{KomariUrl, SessionToken},
        },
        infrastructure::{
            jsonrpc::{MalformedResponse, RequestFrame, ResponseId, decode_response},
            socket::SocketConnection,
        },
    },
};
use futures::future::{BoxFuture, FutureExt, Shared};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{Client, header::COOKIE};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    num::NonZeroU32,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};
use url::Url;

/// Session token shared between the RPC transport and the REST collaborator.
pub(crate) type SharedSession = Arc<RwLock<Option<SessionToken>>>;

type Establishing = Shared<BoxFuture<'static, RpcResult<Arc<SocketConnection>>>>;

const EVENT_CAPACITY: usize = 16;

#[derive(Default)]
struct SocketSlot {
    connection: Option<Arc<SocketConnection>>,
    establishing: Option<Establishing>,
}

struct Inner {
    http: Client,
    rpc_endpoint: Url,
    socket_endpoint: Url,
    timeout: Duration,
    next_id: AtomicU64,
    next_generation: AtomicU64,
    /// Bumped by `close`; establishments started before a close are discarded.
    close_epoch: AtomicU64,
    use_socket: AtomicBool,
    session: SharedSession,
    socket: Mutex<SocketSlot>,
    events: broadcast::Sender<TransportEvent>,
    rate_limiter: Option<DefaultDirectRateLimiter>,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, SocketSlot> {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn cookie(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(SessionToken::as_cookie_header)
    }
}

/// JSON-RPC 2.0 client over HTTP or WebSocket.
///
/// Cloning is cheap; clones share the same connection, id counter and
/// pending requests.
///
/// - Every call gets a fresh integer id, strictly increasing for the lifetime
///   of the client, and responses are matched by id only.
/// - In socket mode the connection is opened lazily; concurrent callers share
///   one in-flight establishment.
/// - Socket open/close transitions are broadcast as [`TransportEvent`]s.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("rpc_endpoint", &self.inner.rpc_endpoint.as_str())
            .field("use_socket", &self.uses_socket())
            .field("socket_open", &self.is_socket_open())
            .finish()
    }
}

impl RpcClient {
    /// Creates a client in HTTP mode.
    ///
    /// # Errors
    /// Returns `KomariError::Connection` if the HTTP client cannot be built and
    /// `KomariError::Config` if the rate limit is zero.
    pub(crate) fn new(
        url: &KomariUrl,
        config: &ClientConfig,
        session: SharedSession,
    ) -> KomariResult<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| KomariError::Connection(e.to_string()))?;

        let rate_limiter = match config.rate_limit {
            Some(rl) => {
                let per_second = NonZeroU32::new(rl.requests_per_second).ok_or_else(|| {
                    KomariError::Config("requests_per_second must be greater than 0".to_string())
                })?;
                let burst = NonZeroU32::new(rl.burst_size).ok_or_else(|| {
                    KomariError::Config("burst_size must be greater than 0".to_string())
                })?;
                Some(DefaultDirectRateLimiter::direct(
                    Quota::per_second(per_second).allow_burst(burst),
                ))
            }
            None => None,
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                rpc_endpoint: url.rpc_endpoint(),
                socket_endpoint: url.socket_endpoint(),
                timeout: config.request_timeout,
                next_id: AtomicU64::new(0),
                next_generation: AtomicU64::new(0),
                close_epoch: AtomicU64::new(0),
                use_socket: AtomicBool::new(false),
                session,
                socket: Mutex::new(SocketSlot::default()),
                events,
                rate_limiter,
            }),
        })
    }

    /// Calls `method` with optional params and decodes the result into `T`.
    ///
    /// # Errors
    /// - `RpcErrorKind::Backend` with the backend's code/message for error objects
    /// - `RpcErrorKind::Transport` for network failures and non-2xx statuses
    /// - `RpcErrorKind::Timeout` when the request outlives the configured timeout
    /// - `RpcErrorKind::Closed` when the socket closes before a response arrives
    /// - `RpcErrorKind::Protocol` when the result does not decode into `T`
    pub async fn call<P, T>(&self, method: &str, params: Option<&P>) -> RpcResult<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let value = if self.uses_socket() {
            let connection = tokio::time::timeout(self.inner.timeout, self.ensure_socket())
                .await
                .map_err(|_| RpcError::timeout())??;
            self.call_on_socket(&connection, method, params).await?
        } else {
            self.call_http(method, params).await?
        };

        serde_json::from_value(value).map_err(|e| {
            RpcError::protocol(format!("Unexpected result for '{}': {}", method, e))
        })
    }

    /// Switches future calls between HTTP (`false`) and the socket (`true`).
    ///
    /// Switching to HTTP closes an open socket and rejects its in-flight calls.
    pub fn set_transport_mode(&self, use_socket: bool) {
        let previous = self.inner.use_socket.swap(use_socket, Ordering::SeqCst);
        if previous != use_socket {
            info!(
                transport = if use_socket { "websocket" } else { "http" },
                "Switching RPC transport"
            );
            if !use_socket {
                self.close();
            }
        }
    }

    /// Returns true if calls currently go over the socket.
    pub fn uses_socket(&self) -> bool {
        self.inner.use_socket.load(Ordering::SeqCst)
    }

    /// Returns true if a socket is open right now.
    pub fn is_socket_open(&self) -> bool {
        self.inner
            .slot()
            .connection
            .as_ref()
            .is_some_and(|connection| connection.is_open())
    }

    /// Generation of the socket that is open right now, if any.
    ///
    /// Each socket gets a fresh generation, so a caller can tell a
    /// [`TransportEvent::Closed`] of its own socket from one of a replaced
    /// socket.
    pub fn socket_generation(&self) -> Option<u64> {
        self.inner
            .slot()
            .connection
            .as_ref()
            .filter(|connection| connection.is_open())
            .map(|connection| connection.generation())
    }

    /// Opens the socket if needed and resolves once its handshake completed.
    pub async fn ensure_connected(&self, timeout: Duration) -> RpcResult<()> {
        tokio::time::timeout(timeout, self.ensure_socket())
            .await
            .map_err(|_| RpcError::timeout())??;
        Ok(())
    }

    /// Like [`ensure_connected`](Self::ensure_connected), but also requires a
    /// `rpc.ping` over the socket to answer `"pong"` within `timeout`.
    pub async fn ensure_connected_verified(&self, timeout: Duration) -> RpcResult<()> {
        tokio::time::timeout(timeout, async {
            let connection = self.ensure_socket().await?;
            let reply = self
                .call_on_socket::<Value>(&connection, "rpc.ping", None)
                .await?;
            if reply != Value::String("pong".to_string()) {
                return Err(RpcError::protocol(format!(
                    "Unexpected ping response: {}",
                    reply
                )));
            }
            Ok(())
        })
        .await
        .map_err(|_| RpcError::timeout())?
    }

    /// Closes the socket, rejecting all pending requests. Idempotent.
    pub fn close(&self) {
        self.inner.close_epoch.fetch_add(1, Ordering::SeqCst);
        let connection = {
            let mut slot = self.inner.slot();
            slot.establishing = None;
            slot.connection.take()
        };
        if let Some(connection) = connection {
            connection.shutdown();
        }
    }

    /// Subscribes to socket open/close events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn ensure_socket(&self) -> RpcResult<Arc<SocketConnection>> {
        let establishing = {
            let mut slot = self.inner.slot();
            if let Some(connection) = slot.connection.as_ref().filter(|c| c.is_open()) {
                return Ok(Arc::clone(connection));
            }
            match &slot.establishing {
                Some(establishing) => establishing.clone(),
                None => {
                    let establishing = Self::establish(Arc::clone(&self.inner)).boxed().shared();
                    slot.establishing = Some(establishing.clone());
                    establishing
                }
            }
        };
        establishing.await
    }

    async fn establish(inner: Arc<Inner>) -> RpcResult<Arc<SocketConnection>> {
        let epoch = inner.close_epoch.load(Ordering::SeqCst);
        let generation = inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let stale = inner.slot().connection.take();
        if let Some(stale) = stale {
            stale.shutdown();
        }

        let cookie = inner.cookie().await;
        let opened = SocketConnection::open(
            &inner.socket_endpoint,
            cookie,
            generation,
            inner.events.clone(),
        )
        .await;

        let mut slot = inner.slot();
        if inner.close_epoch.load(Ordering::SeqCst) != epoch {
            // Closed while connecting; the caller that closed wins.
            drop(slot);
            if let Ok(connection) = opened {
                connection.shutdown();
            }
            return Err(RpcError::closed());
        }
        slot.establishing = None;
        let connection = Arc::new(opened?);
        slot.connection = Some(Arc::clone(&connection));
        drop(slot);

        let _ = inner.events.send(TransportEvent::Opened {
            generation: connection.generation(),
        });
        Ok(connection)
    }

    async fn call_on_socket<P: Serialize>(
        &self,
        connection: &SocketConnection,
        method: &str,
        params: Option<&P>,
    ) -> RpcResult<Value> {
        let id = self.next_id();
        let payload = serde_json::to_string(&RequestFrame::new(id, method, params))
            .map_err(|e| RpcError::protocol(format!("Failed to encode request: {}", e)))?;
        debug!(id, method, "RPC call over WebSocket");
        connection.call(id, payload, self.inner.timeout).await
    }

    async fn call_http<P: Serialize>(&self, method: &str, params: Option<&P>) -> RpcResult<Value> {
        let id = self.next_id();
        let frame = RequestFrame::new(id, method, params);

        if let Some(limiter) = &self.inner.rate_limiter {
            limiter.until_ready().await;
        }

        let mut request = self
            .inner
            .http
            .post(self.inner.rpc_endpoint.clone())
            .timeout(self.inner.timeout)
            .json(&frame);
        if let Some(cookie) = self.inner.cookie().await {
            request = request.header(COOKIE, cookie);
        }

        debug!(id, method, "RPC call over HTTP");
        let response = request.send().await.map_err(classify_http_error)?;

        if !response.status().is_success() {
            return Err(RpcError::transport(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(classify_http_error)?;
        let frame = decode_response(&body).map_err(|MalformedResponse(reason)| {
            RpcError::protocol(format!("Malformed response: {}", reason))
        })?;

        if let Some(echoed) = frame.id.as_ref().and_then(ResponseId::as_request_id) {
            if echoed != id {
                return Err(RpcError::protocol(format!(
                    "Response id {} does not match request id {}",
                    echoed, id
                )));
            }
        }
        frame.outcome
    }
}

fn classify_http_error(error: reqwest::Error) -> RpcError {
    if error.is_timeout() {
        RpcError::timeout()
    } else {
        RpcError::transport(format!("Network error: {}", error))
    }
}
