use crate::core::domain::error::ValidationError;
use url::Url;

const MAX_URL_LENGTH: usize = 2083; // RFC 7230 practical limit
const RPC_PATH: &str = "api/rpc2";
const API_PATH: &str = "api";

/// A validated base URL of a Komari backend.
///
/// All endpoints the client talks to are derived from it:
/// - `<base>/api/rpc2` for JSON-RPC over HTTP POST
/// - the same path with `ws`/`wss` for JSON-RPC over WebSocket
/// - `<base>/api/...` for the REST collaborator endpoints
///
/// # Examples
///
/// ```
/// use komari_client::KomariUrl;
///
/// let url = KomariUrl::parse("https://status.example.com").unwrap();
/// assert_eq!(url.rpc_endpoint().as_str(), "https://status.example.com/api/rpc2");
/// assert_eq!(url.socket_endpoint().as_str(), "wss://status.example.com/api/rpc2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KomariUrl(Url);

impl KomariUrl {
    /// Parses and validates a base URL.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let url = validate_url(value)?;
        Ok(Self(url))
    }

    /// Returns the base URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// HTTP endpoint of the JSON-RPC service.
    #[must_use]
    pub fn rpc_endpoint(&self) -> Url {
        self.join(RPC_PATH)
    }

    /// WebSocket endpoint of the JSON-RPC service.
    #[must_use]
    pub fn socket_endpoint(&self) -> Url {
        let mut endpoint = self.rpc_endpoint();
        let scheme = if endpoint.scheme() == "https" { "wss" } else { "ws" };
        // http -> ws and https -> wss are always permitted scheme changes.
        let _ = endpoint.set_scheme(scheme);
        endpoint
    }

    /// URL of a REST endpoint below `/api`.
    #[must_use]
    pub fn api_endpoint(&self, path: &str) -> Url {
        self.join(&format!("{}/{}", API_PATH, path.trim_start_matches('/')))
    }

    fn join(&self, path: &str) -> Url {
        let mut url = self.0.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base, path));
        url
    }
}

/// Validates a base URL: non-empty, bounded, http(s), no query or fragment.
pub(crate) fn validate_url(value: &str) -> Result<Url, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::field("url", "URL cannot be empty"));
    }
    if value.len() > MAX_URL_LENGTH {
        return Err(ValidationError::Format(format!(
            "URL exceeds maximum length of {} characters",
            MAX_URL_LENGTH
        )));
    }

    let url = Url::parse(value)
        .map_err(|e| ValidationError::Format(format!("Invalid URL format: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::ConstraintViolation(
            "Invalid scheme. Must be one of: http, https".to_string(),
        ));
    }
    if url.host_str().is_none() {
        return Err(ValidationError::field("url", "URL must contain a host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ValidationError::ConstraintViolation(
            "Base URL must not carry a query or fragment".to_string(),
        ));
    }
    Ok(url)
}
