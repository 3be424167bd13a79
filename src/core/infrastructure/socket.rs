//! A single WebSocket connection carrying JSON-RPC traffic.
//!
//! Each connection owns a reader task that routes responses to pending
//! callers by id and a writer task that drains an outbound queue. When the
//! remote side goes away every pending request is rejected with a closed
//! error and a [`TransportEvent::Closed`] is broadcast.

use crate::core::{
    domain::{
        error::{RpcError, RpcResult},
        model::connection_state::TransportEvent,
    },
    infrastructure::jsonrpc::{MalformedResponse, ResponseFrame, decode_response},
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::COOKIE},
    },
};
use tracing::{debug, trace, warn};
use url::Url;

type Completion = oneshot::Sender<RpcResult<Value>>;

#[derive(Default)]
struct PendingRequests(Mutex<HashMap<u64, Completion>>);

impl PendingRequests {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Completion>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reject_all(&self, error: &RpcError) -> usize {
        let drained: Vec<Completion> = self.lock().drain().map(|(_, tx)| tx).collect();
        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }
}

/// State shared between the connection handle and its reader task.
struct Shared {
    generation: u64,
    open: AtomicBool,
    pending: PendingRequests,
    events: broadcast::Sender<TransportEvent>,
}

impl Shared {
    /// Marks the connection closed exactly once and rejects what is pending.
    fn mark_closed(&self, remote: bool) -> bool {
        if !self.open.swap(false, Ordering::SeqCst) {
            return false;
        }
        let rejected = self.pending.reject_all(&RpcError::closed());
        debug!(
            generation = self.generation,
            remote, rejected, "WebSocket connection closed"
        );
        let _ = self.events.send(TransportEvent::Closed {
            generation: self.generation,
            remote,
        });
        true
    }

    fn route(&self, payload: &str) {
        match decode_response(payload) {
            Ok(ResponseFrame { id: None, .. }) => {
                trace!("Ignoring frame without id");
            }
            Ok(ResponseFrame {
                id: Some(id),
                outcome,
            }) => {
                let waiting = id
                    .as_request_id()
                    .and_then(|request_id| self.pending.lock().remove(&request_id));
                match waiting {
                    Some(tx) => {
                        let _ = tx.send(outcome);
                    }
                    None => debug!(?id, "Dropping response for unknown request id"),
                }
            }
            Err(MalformedResponse(reason)) => {
                warn!(%reason, "Dropping malformed WebSocket frame");
            }
        }
    }
}

/// Handle to an open socket.
pub(crate) struct SocketConnection {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

impl SocketConnection {
    /// Opens a socket and starts its reader and writer tasks.
    ///
    /// Resolves once the WebSocket handshake completed.
    pub(crate) async fn open(
        endpoint: &Url,
        cookie: Option<String>,
        generation: u64,
        events: broadcast::Sender<TransportEvent>,
    ) -> RpcResult<Self> {
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| RpcError::transport(format!("Invalid WebSocket endpoint: {}", e)))?;
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| RpcError::transport(format!("Invalid session cookie: {}", e)))?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| RpcError::transport(format!("WebSocket connection error: {}", e)))?;
        debug!(generation, %endpoint, "WebSocket connection opened");

        let (mut sink, mut source) = stream.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let closing = message.is_close();
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "WebSocket send failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let shared = Arc::new(Shared {
            generation,
            open: AtomicBool::new(true),
            pending: PendingRequests::default(),
            events,
        });

        let reader_shared = Arc::clone(&shared);
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Close(_)) => break,
                    Ok(message @ (Message::Text(_) | Message::Binary(_))) => {
                        match message.to_text() {
                            Ok(payload) => reader_shared.route(payload),
                            Err(_) => warn!("Dropping non UTF-8 WebSocket frame"),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
            reader_shared.mark_closed(true);
            writer.abort();
        });

        Ok(Self {
            shared,
            outbound,
            reader,
        })
    }

    pub(crate) fn generation(&self) -> u64 {
        self.shared.generation
    }

    pub(crate) fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Sends a request and waits for the response with the same id.
    pub(crate) async fn call(
        &self,
        id: u64,
        payload: String,
        timeout: Duration,
    ) -> RpcResult<Value> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock();
            if !self.is_open() {
                return Err(RpcError::transport("WebSocket not connected"));
            }
            pending.insert(id, tx);
        }

        if self.outbound.send(Message::text(payload)).is_err() {
            self.shared.pending.lock().remove(&id);
            return Err(RpcError::transport("WebSocket not connected"));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::closed()),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                Err(RpcError::timeout())
            }
        }
    }

    /// Closes the socket from this side. Pending requests are rejected.
    pub(crate) fn shutdown(&self) {
        if self.shared.mark_closed(false) {
            let _ = self.outbound.send(Message::Close(None));
        }
        self.reader.abort();
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
