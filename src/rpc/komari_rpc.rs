//! Typed wrappers over the Komari JSON-RPC methods.
//!
//! Pure request shaping and response typing: no retry, no transport
//! selection. Errors are whatever the transport reported.

use crate::core::{
    domain::{
        error::RpcResult,
        model::{
            node_descriptor::NodeDescriptors,
            node_status::NodeStatuses,
            records::{PingRecord, RecordKind, RecordsQuery, RecordsResponse, StatusRecord},
            session::{MeInfo, MethodMeta, VersionInfo},
        },
    },
    infrastructure::rpc_client::RpcClient,
};
use serde::Serialize;

#[derive(Serialize)]
struct UuidParams<'a> {
    uuid: &'a str,
}

#[derive(Serialize)]
struct RecentParams<'a> {
    uuid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

/// Komari RPC methods on top of an [`RpcClient`].
#[derive(Debug, Clone)]
pub struct KomariRpc {
    client: RpcClient,
}

impl KomariRpc {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    /// The underlying transport client.
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// `rpc.ping`; a healthy backend answers `"pong"`.
    pub async fn ping(&self) -> RpcResult<String> {
        self.client.call::<(), _>("rpc.ping", None).await
    }

    /// `rpc.getVersion`
    pub async fn version(&self) -> RpcResult<VersionInfo> {
        self.client.call::<(), _>("rpc.getVersion", None).await
    }

    /// `rpc.getMethods`: names of every method the backend exposes.
    pub async fn methods(&self) -> RpcResult<Vec<String>> {
        self.client.call::<(), _>("rpc.getMethods", None).await
    }

    /// `rpc.getHelp`
    pub async fn help(&self) -> RpcResult<Vec<MethodMeta>> {
        self.client.call::<(), _>("rpc.getHelp", None).await
    }

    /// `client.getNodes`: all descriptors, or only the one with `uuid`.
    pub async fn nodes(&self, uuid: Option<&str>) -> RpcResult<NodeDescriptors> {
        let params = uuid.map(|uuid| UuidParams { uuid });
        self.client.call("client.getNodes", params.as_ref()).await
    }

    /// `nodeStatus.getLatest`: latest status sample of every node.
    pub async fn latest_statuses(&self) -> RpcResult<NodeStatuses> {
        self.client.call::<(), _>("nodeStatus.getLatest", None).await
    }

    /// `nodeStatus.getRecent`: the most recent samples of one node.
    pub async fn recent_statuses(
        &self,
        uuid: &str,
        limit: Option<u32>,
    ) -> RpcResult<RecordsResponse<StatusRecord>> {
        let params = RecentParams { uuid, limit };
        self.client.call("nodeStatus.getRecent", Some(&params)).await
    }

    /// Historical load records filtered by `query`.
    pub async fn load_records(
        &self,
        query: &RecordsQuery,
    ) -> RpcResult<RecordsResponse<StatusRecord>> {
        self.client.call(RecordKind::Load.method(), Some(query)).await
    }

    /// Historical ping records filtered by `query`.
    pub async fn ping_records(
        &self,
        query: &RecordsQuery,
    ) -> RpcResult<RecordsResponse<PingRecord>> {
        self.client.call(RecordKind::Ping.method(), Some(query)).await
    }

    /// `common:getMe`: identity bound to the current session cookie.
    pub async fn me(&self) -> RpcResult<MeInfo> {
        self.client.call::<(), _>("common:getMe", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ClientConfig, KomariUrl,
        core::domain::error::{PROTOCOL_ERROR_CODE, RpcErrorKind, TIMEOUT_ERROR_CODE},
    };
    use std::{sync::Arc, time::Duration};
    use tokio::sync::RwLock;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    fn create_test_rpc(server_url: &str, timeout: Duration) -> KomariRpc {
        let url = KomariUrl::parse(server_url).unwrap();
        let config = ClientConfig {
            request_timeout: timeout,
            ..Default::default()
        };
        let client = RpcClient::new(&url, &config, Arc::new(RwLock::new(None))).unwrap();
        KomariRpc::new(client)
    }

    async fn mount_result(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .and(body_partial_json(serde_json::json!({"method": rpc_method})))
            .respond_with(move |request: &wiremock::Request| {
                let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "jsonrpc": "2.0",
                    "result": result.clone(),
                    "id": body["id"].clone()
                }))
            })
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_ping_over_http() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_secs(5));
        mount_result(&mock_server, "rpc.ping", serde_json::json!("pong")).await;

        assert_eq!(rpc.ping().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_nodes_by_uuid_sends_params() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_secs(5));

        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .and(body_partial_json(serde_json::json!({
                "jsonrpc": "2.0",
                "method": "client.getNodes",
                "params": {"uuid": "a1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "result": {"a1": {"uuid": "a1", "name": "tokyo-1", "weight": 2}},
                "id": 1
            })))
            .mount(&mock_server)
            .await;

        let nodes = rpc.nodes(Some("a1")).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes["a1"].name, "tokyo-1");
    }

    #[tokio::test]
    async fn test_latest_statuses() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_secs(5));
        mount_result(
            &mock_server,
            "nodeStatus.getLatest",
            serde_json::json!({
                "a1": {"client": "a1", "cpu": 42.0, "online": true, "uptime": 10},
                "b2": {"client": "b2", "online": false}
            }),
        )
        .await;

        let statuses = rpc.latest_statuses().await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses["a1"].online);
        assert_eq!(statuses["a1"].cpu, 42.0);
        assert!(!statuses["b2"].online);
    }

    #[tokio::test]
    async fn test_load_records_with_filters() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_secs(5));

        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .and(body_partial_json(serde_json::json!({
                "method": "records.getLoadRecords",
                "params": {"uuid": "a1", "hours": 4, "maxCount": 100}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "result": {"count": 1, "records": [{"client": "a1", "time": "t", "cpu": 3.5}]},
                "id": 1
            })))
            .mount(&mock_server)
            .await;

        let query = RecordsQuery::new("a1").hours(4).max_count(100);
        let records = rpc.load_records(&query).await.unwrap();
        assert_eq!(records.count, Some(1));
        assert_eq!(records.records[0].cpu, 3.5);
    }

    #[tokio::test]
    async fn test_backend_error_propagates_unchanged() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_secs(5));

        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {"code": -32602, "message": "Invalid params", "data": {"field": "uuid"}},
                "id": 1
            })))
            .mount(&mock_server)
            .await;

        let err = rpc.me().await.unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::Backend);
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "Invalid params");
        assert_eq!(err.data, Some(serde_json::json!({"field": "uuid"})));
    }

    #[tokio::test]
    async fn test_http_timeout_is_classified() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_millis(200));

        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"jsonrpc": "2.0", "result": "pong", "id": 1}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let err = rpc.ping().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!err.is_backend());
        assert_eq!(err.code, TIMEOUT_ERROR_CODE);
    }

    #[tokio::test]
    async fn test_http_status_error_is_transport() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_secs(5));

        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let err = rpc.ping().await.unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::Transport);
        assert_eq!(err.message, "HTTP error: 503 Service Unavailable");
    }

    #[tokio::test]
    async fn test_malformed_body_is_protocol_error() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_secs(5));

        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let err = rpc.ping().await.unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::Protocol);
        assert_eq!(err.code, PROTOCOL_ERROR_CODE);
    }

    #[tokio::test]
    async fn test_backend_parse_error_is_not_a_local_error() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_secs(5));

        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {"code": -32700, "message": "Parse error"},
                "id": 1
            })))
            .mount(&mock_server)
            .await;

        let err = rpc.ping().await.unwrap_err();
        assert!(err.is_backend());
        assert_eq!(err.code, -32700);
        assert_ne!(err.code, PROTOCOL_ERROR_CODE);
    }

    #[tokio::test]
    async fn test_http_ids_increase_per_call() {
        let mock_server = MockServer::start().await;
        let rpc = create_test_rpc(&mock_server.uri(), Duration::from_secs(5));
        mount_result(&mock_server, "rpc.ping", serde_json::json!("pong")).await;

        for _ in 0..3 {
            rpc.ping().await.unwrap();
        }

        let ids: Vec<u64> = mock_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|request| {
                let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
                body["id"].as_u64().unwrap()
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
