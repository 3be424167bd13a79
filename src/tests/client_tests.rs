use crate::{
    ClientConfig, ConnectionState, KomariClient, KomariConfig, KomariError, OrchestratorConfig,
    ValidationError, create,
    tests::support::{RpcResponder, init_tracing},
};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn nodes_json(uuids: &[(&str, i64)]) -> Value {
    let mut nodes = serde_json::Map::new();
    for (uuid, weight) in uuids {
        nodes.insert(
            uuid.to_string(),
            json!({"uuid": uuid, "name": format!("node-{}", uuid), "weight": weight, "group": "eu"}),
        );
    }
    Value::Object(nodes)
}

fn statuses_json(online: &[&str]) -> Value {
    let mut statuses = serde_json::Map::new();
    for uuid in online {
        statuses.insert(
            uuid.to_string(),
            json!({"client": uuid, "online": true, "cpu": 12.5, "uptime": 3600}),
        );
    }
    Value::Object(statuses)
}

async fn mount_site(mock_server: &MockServer, transport: &str) {
    Mock::given(method("GET"))
        .and(path("/api/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "",
            "data": {
                "sitename": "Komari",
                "theme_settings": {"rpcTransportMode": transport}
            }
        })))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logged_in": false,
            "username": ""
        })))
        .mount(mock_server)
        .await;
}

#[test]
fn test_builder_validates_inputs() {
    let result = KomariClient::builder().base_url("not a url").build();
    assert!(matches!(result, Err(KomariError::Validation(_))));

    let result = KomariClient::builder()
        .base_url("http://127.0.0.1:25774")
        .credentials("", "secret")
        .build();
    assert!(matches!(result, Err(KomariError::Validation(_))));

    let result = KomariClient::builder()
        .base_url("http://127.0.0.1:25774")
        .credentials("admin", "secret")
        .two_factor_code("12ab")
        .build();
    assert!(matches!(result, Err(KomariError::Validation(_))));

    let client = KomariClient::builder()
        .base_url("https://status.example.com/")
        .credentials("admin", "secret")
        .two_factor_code("123456")
        .build()
        .unwrap();
    assert_eq!(
        client.logout_url().as_str(),
        "https://status.example.com/api/logout"
    );
    assert_eq!(
        client.oauth_url().as_str(),
        "https://status.example.com/api/oauth"
    );
}

#[tokio::test]
async fn test_login_requires_credentials() {
    let client = KomariClient::builder()
        .base_url("http://127.0.0.1:25774")
        .build()
        .unwrap();

    let result = client.login().await;
    assert!(matches!(
        result,
        Err(KomariError::Validation(ValidationError::Field { ref field, .. })) if field == "credentials"
    ));
    assert!(!client.is_authenticated().await);
}

#[tokio::test]
async fn test_rest_endpoints() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server, "websocket").await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "",
            "data": {"version": "1.0.7", "hash": "abc1234"}
        })))
        .mount(&mock_server)
        .await;

    let client = KomariClient::builder()
        .base_url(mock_server.uri())
        .build()
        .unwrap();

    let settings = client.public_settings().await.unwrap();
    assert_eq!(settings.sitename, "Komari");
    let me = client.me().await.unwrap();
    assert!(!me.logged_in);
    let version = client.version().await.unwrap();
    assert_eq!(version.version, "1.0.7");
}

#[tokio::test]
async fn test_login_session_is_shared_with_rpc() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "set-cookie": {"session_token": "sess-42"}
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/rpc2"))
        .and(header("cookie", "session_token=sess-42"))
        .and(body_partial_json(json!({"method": "common:getMe"})))
        .respond_with(RpcResponder::new().result(
            "common:getMe",
            json!({"logged_in": true, "username": "admin"}),
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = KomariClient::builder()
        .base_url(mock_server.uri())
        .credentials("admin", "hunter2")
        .build()
        .unwrap();

    let token = client.login().await.unwrap();
    assert_eq!(token.as_str(), "sess-42");
    assert!(client.is_authenticated().await);

    let me = client.rpc().me().await.unwrap();
    assert!(me.logged_in);
    assert_eq!(me.username, "admin");

    client.clear_session().await;
    assert!(client.session_token().await.is_none());
}

#[tokio::test]
async fn test_create_rejects_invalid_config() {
    let mut config = KomariConfig::default();
    config.orchestrator.poll_interval = Duration::ZERO;
    assert!(matches!(create(&config), Err(KomariError::Config(_))));
}

#[tokio::test]
async fn test_fleet_over_http_end_to_end() {
    init_tracing();
    let mock_server = MockServer::start().await;
    mount_site(&mock_server, "http").await;
    Mock::given(method("POST"))
        .and(path("/api/rpc2"))
        .respond_with(
            RpcResponder::new()
                .result("rpc.ping", json!("pong"))
                .result("client.getNodes", nodes_json(&[("a1", 2), ("b2", 1)]))
                .result("nodeStatus.getLatest", statuses_json(&["a1"])),
        )
        .mount(&mock_server)
        .await;

    let config = KomariConfig {
        client: ClientConfig {
            base_url: mock_server.uri(),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        },
        orchestrator: OrchestratorConfig {
            poll_interval: Duration::from_millis(50),
            ..Default::default()
        },
    };
    let orchestrator = create(&config).unwrap();
    assert!(orchestrator.status().loading);

    orchestrator.init().await.unwrap();
    {
        let store = orchestrator.store();
        let order: Vec<&str> = store.nodes().iter().map(|node| node.uuid()).collect();
        assert_eq!(order, vec!["b2", "a1"]);
        assert_eq!(store.online_count(), 1);
        assert_eq!(store.groups(), vec!["eu"]);
        assert_eq!(store.connection_state(), ConnectionState::Disconnected);
    }
    let status = orchestrator.status();
    assert!(!status.loading);
    assert!(!status.logged_in);
    assert!(!orchestrator.backend().rpc().client().uses_socket());

    // The backend drops a node and brings the other online.
    mock_server.reset().await;
    Mock::given(method("POST"))
        .and(path("/api/rpc2"))
        .respond_with(
            RpcResponder::new()
                .result("rpc.ping", json!("pong"))
                .result("client.getNodes", nodes_json(&[("b2", 1)]))
                .result("nodeStatus.getLatest", statuses_json(&["a1", "b2"])),
        )
        .mount(&mock_server)
        .await;

    let mut converged = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let store = orchestrator.store();
        if store.total_count() == 1 && store.online_count() == 1 {
            converged = true;
            break;
        }
    }
    assert!(converged, "store did not pick up the new snapshot");
    assert!(orchestrator.store().get("a1").is_none());
    assert!(!orchestrator.status().connection_error);

    orchestrator.dispose();
    assert_eq!(orchestrator.store().total_count(), 0);
}

#[tokio::test]
async fn test_fleet_init_fails_when_backend_is_down() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rpc2"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let config = KomariConfig {
        client: ClientConfig {
            base_url: mock_server.uri(),
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = create(&config).unwrap();

    let result = orchestrator.init().await;
    assert!(matches!(result, Err(KomariError::BackendUnavailable(_))));
    assert!(orchestrator.status().connection_error);
    assert!(!orchestrator.status().loading);
}
