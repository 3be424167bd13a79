//! Shared fixtures: a local WebSocket JSON-RPC server and a wiremock
//! responder that answers JSON-RPC calls by method name.

use crate::{
    ClientConfig, KomariUrl, RpcClient,
    core::infrastructure::rpc_client::SharedSession,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::RwLock,
    task::JoinHandle,
};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};

pub(crate) type ServerSocket = WebSocketStream<TcpStream>;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A WebSocket server on an ephemeral local port. Every accepted connection
/// is handed to the handler on its own task.
pub(crate) struct SocketServer {
    pub(crate) base_url: String,
    accepted: Arc<AtomicUsize>,
    cookies: Arc<Mutex<Vec<Option<String>>>>,
    task: JoinHandle<()>,
}

impl SocketServer {
    pub(crate) async fn start<F, Fut>(handler: F) -> Self
    where
        F: Fn(ServerSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let cookies = Arc::new(Mutex::new(Vec::new()));

        let counter = Arc::clone(&accepted);
        let seen_cookies = Arc::clone(&cookies);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen_cookies = Arc::clone(&seen_cookies);
                let callback = move |request: &Request,
                                     response: Response|
                      -> Result<Response, ErrorResponse> {
                    let cookie = request
                        .headers()
                        .get("cookie")
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string);
                    seen_cookies.lock().unwrap().push(cookie);
                    Ok(response)
                };
                let Ok(socket) = accept_hdr_async(stream, callback).await else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handler(socket));
            }
        });

        Self {
            base_url: format!("http://{}", address),
            accepted,
            cookies,
            task,
        }
    }

    /// Number of completed WebSocket handshakes.
    pub(crate) fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// `Cookie` header of every handshake, in order.
    pub(crate) fn cookies(&self) -> Vec<Option<String>> {
        self.cookies.lock().unwrap().clone()
    }

    /// An RPC client in socket mode pointing at this server.
    pub(crate) fn client(&self, timeout: Duration) -> RpcClient {
        self.client_with_session(timeout, Arc::new(RwLock::new(None)))
    }

    pub(crate) fn client_with_session(
        &self,
        timeout: Duration,
        session: SharedSession,
    ) -> RpcClient {
        let url = KomariUrl::parse(&self.base_url).unwrap();
        let config = ClientConfig {
            base_url: self.base_url.clone(),
            request_timeout: timeout,
            ..Default::default()
        };
        let client = RpcClient::new(&url, &config, session).unwrap();
        client.set_transport_mode(true);
        client
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Next JSON-RPC request from the client, or `None` once it went away.
pub(crate) async fn next_request(socket: &mut ServerSocket) -> Option<Value> {
    while let Some(frame) = socket.next().await {
        match frame {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

pub(crate) async fn send_json(socket: &mut ServerSocket, value: Value) {
    let _ = socket.send(Message::text(value.to_string())).await;
}

pub(crate) fn result_for(request: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "result": result, "id": request["id"].clone()})
}

/// Answers `rpc.ping` with `"pong"` and any other method with its params.
pub(crate) async fn echo_handler(mut socket: ServerSocket) {
    while let Some(request) = next_request(&mut socket).await {
        let result = match request["method"].as_str() {
            Some("rpc.ping") => json!("pong"),
            _ => request.get("params").cloned().unwrap_or(Value::Null),
        };
        send_json(&mut socket, result_for(&request, result)).await;
    }
}

/// Wiremock responder for `POST /api/rpc2` that answers by method name and
/// echoes the request id. Unknown methods get a "Method not found" error.
pub(crate) struct RpcResponder {
    results: HashMap<String, Value>,
}

impl RpcResponder {
    pub(crate) fn new() -> Self {
        Self {
            results: HashMap::new(),
        }
    }

    pub(crate) fn result(mut self, method: &str, result: Value) -> Self {
        self.results.insert(method.to_string(), result);
        self
    }
}

impl wiremock::Respond for RpcResponder {
    fn respond(&self, request: &wiremock::Request) -> wiremock::ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let method = body["method"].as_str().unwrap_or_default();
        let payload = match self.results.get(method) {
            Some(result) => json!({"jsonrpc": "2.0", "result": result, "id": body["id"].clone()}),
            None => json!({
                "jsonrpc": "2.0",
                "error": {"code": -32601, "message": "Method not found"},
                "id": body["id"].clone()
            }),
        };
        wiremock::ResponseTemplate::new(200).set_body_json(payload)
    }
}
