//! Internal HTTP client for the REST endpoints below `/api`.

use crate::{
    ClientConfig, KomariError, KomariResult,
    core::{
        domain::value_object::{KomariUrl, SessionToken},
        infrastructure::rpc_client::SharedSession,
    },
};
use reqwest::{Client, StatusCode, header::COOKIE};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// The `{status, message, data}` envelope most REST endpoints answer with.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// Internal HTTP client that provides methods to call the Komari REST API.
///
/// The session cookie, when present, is attached to every request. The
/// session is shared with the RPC transport so that a login performed here
/// is visible to both.
#[derive(Debug)]
pub struct ApiClient {
    http_client: Client,
    url: KomariUrl,
    session: SharedSession,
    timeout: Duration,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Errors
    /// Returns `KomariError::Connection` if the HTTP client cannot be built.
    pub fn new(
        url: KomariUrl,
        config: &ClientConfig,
        session: SharedSession,
    ) -> KomariResult<Self> {
        let http_client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| KomariError::Connection(e.to_string()))?;

        Ok(Self {
            http_client,
            url,
            session,
            timeout: config.request_timeout,
        })
    }

    /// Returns the base URL the client talks to.
    pub fn url(&self) -> &KomariUrl {
        &self.url
    }

    /// Stores the session token (after a successful login).
    pub async fn set_session(&self, token: SessionToken) {
        let mut lock = self.session.write().await;
        *lock = Some(token);
    }

    /// Forgets the session token.
    pub async fn clear_session(&self) {
        self.session.write().await.take();
    }

    /// Returns the current session token, if any.
    pub async fn session(&self) -> Option<SessionToken> {
        self.session.read().await.clone()
    }

    /// Performs a GET on an endpoint that answers with the status envelope.
    ///
    /// # Errors
    /// Returns `KomariError::Api` if the envelope reports an error and
    /// `KomariError::Connection` if the request or parsing fails.
    pub async fn get<T>(&self, path: &str) -> KomariResult<T>
    where
        T: DeserializeOwned,
    {
        let (status, body) = self.execute(reqwest::Method::GET, path, None::<&()>).await?;
        unwrap_envelope(status, body)
    }

    /// Performs a GET on an endpoint that answers with a bare JSON object.
    pub async fn get_raw<T>(&self, path: &str) -> KomariResult<T>
    where
        T: DeserializeOwned,
    {
        let (status, body) = self.execute(reqwest::Method::GET, path, None::<&()>).await?;
        if !status.is_success() {
            return Err(KomariError::Api {
                status: Some(status.as_u16()),
                message: format!("HTTP error: {}", status),
            });
        }
        serde_json::from_value(body)
            .map_err(|e| KomariError::Connection(format!("Failed to parse response: {}", e)))
    }

    /// Performs a POST with a JSON body and returns the raw status and JSON.
    ///
    /// Callers interpret the body; `/login` for instance answers with a
    /// `set-cookie` object rather than the status envelope.
    pub async fn post<B>(&self, path: &str, body: &B) -> KomariResult<(StatusCode, Value)>
    where
        B: Serialize,
    {
        self.execute(reqwest::Method::POST, path, Some(body)).await
    }

    /// Full URL of a REST endpoint, e.g. for browser redirects.
    pub fn endpoint(&self, path: &str) -> Url {
        self.url.api_endpoint(path)
    }

    async fn execute<B>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> KomariResult<(StatusCode, Value)>
    where
        B: Serialize,
    {
        let url = self.endpoint(path);
        let mut req_builder = self
            .http_client
            .request(method.clone(), url)
            .timeout(self.timeout);

        if let Some(token) = self.session.read().await.as_ref() {
            req_builder = req_builder.header(COOKIE, token.as_cookie_header());
        }

        if let Some(body) = body {
            req_builder = req_builder.json(body);
        }

        debug!(%method, path, "REST request");
        let response = req_builder
            .send()
            .await
            .map_err(|e| KomariError::Connection(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| KomariError::Connection(format!("Failed to read response: {}", e)))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                Err(_) if !status.is_success() => Value::String(text),
                Err(e) => {
                    return Err(KomariError::Connection(format!(
                        "Failed to parse response: {}",
                        e
                    )));
                }
            }
        };
        Ok((status, body))
    }
}

/// Extracts `data` from a status envelope, turning `status: "error"` into
/// `KomariError::Api`.
pub(crate) fn unwrap_envelope<T>(status: StatusCode, body: Value) -> KomariResult<T>
where
    T: DeserializeOwned,
{
    let envelope: Envelope<T> = match serde_json::from_value(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(KomariError::Api {
                status: Some(status.as_u16()),
                message: format!("HTTP error: {}", status),
            });
        }
        Err(e) => {
            return Err(KomariError::Connection(format!(
                "Failed to parse response: {}",
                e
            )));
        }
    };

    if envelope.status == "error" || !status.is_success() {
        let message = if envelope.message.is_empty() {
            "Unknown error".to_string()
        } else {
            envelope.message
        };
        return Err(KomariError::Api {
            status: Some(status.as_u16()),
            message,
        });
    }

    envelope
        .data
        .ok_or_else(|| KomariError::Connection("Response envelope carries no data".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::model::session::{MeInfo, PublicSettings};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    fn create_test_client(server_url: &str) -> ApiClient {
        let url = KomariUrl::parse(server_url).unwrap();
        ApiClient::new(url, &ClientConfig::default(), Arc::new(RwLock::new(None))).unwrap()
    }

    #[tokio::test]
    async fn test_get_unwraps_envelope() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/api/public"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "message": "",
                "data": {"sitename": "Komari", "record_enabled": true}
            })))
            .mount(&mock_server)
            .await;

        let settings: PublicSettings = client.get("public").await.unwrap();
        assert_eq!(settings.sitename, "Komari");
        assert!(settings.record_enabled);
    }

    #[tokio::test]
    async fn test_get_reports_error_envelope() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/api/public"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error",
                "message": "private site",
                "data": null
            })))
            .mount(&mock_server)
            .await;

        let result: KomariResult<PublicSettings> = client.get("public").await;
        assert!(matches!(
            result,
            Err(KomariError::Api { ref message, .. }) if message == "private site"
        ));
    }

    #[tokio::test]
    async fn test_get_raw_sends_session_cookie() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());
        client
            .set_session(SessionToken::new("tok123").unwrap())
            .await;

        Mock::given(method("GET"))
            .and(path("/api/me"))
            .and(header("cookie", "session_token=tok123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "logged_in": true,
                "username": "admin"
            })))
            .mount(&mock_server)
            .await;

        let me: MeInfo = client.get_raw("me").await.unwrap();
        assert!(me.logged_in);
        assert_eq!(me.username, "admin");
    }

    #[tokio::test]
    async fn test_get_raw_http_error() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/api/me"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&mock_server)
            .await;

        let result: KomariResult<MeInfo> = client.get_raw("me").await;
        assert!(matches!(result, Err(KomariError::Api { status: Some(502), .. })));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_connection_error() {
        // Nothing listens on the discard port.
        let client = create_test_client("http://127.0.0.1:9");
        let result: KomariResult<MeInfo> = client.get_raw("me").await;
        assert!(matches!(result, Err(KomariError::Connection(_))));
    }
}
