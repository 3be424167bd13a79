mod auth;
mod config;
mod core;
mod fleet;
mod rpc;

pub use crate::{
    config::{ClientConfig, KomariConfig, OrchestratorConfig, RateLimitConfig},
    core::{
        domain::{
            error::{
                KomariError, KomariResult, PROTOCOL_ERROR_CODE, RpcError, RpcErrorKind, RpcResult,
                TIMEOUT_ERROR_CODE, TRANSPORT_ERROR_CODE, ValidationError,
            },
            model::{
                connection_state::{ConnectionState, Notice, TransportEvent},
                node_descriptor::{NodeDescriptor, NodeDescriptors},
                node_entity::NodeEntity,
                node_status::{NodeLiveStatus, NodeStatus, NodeStatuses},
                records::{
                    PingRecord, PingTask, RecordKind, RecordsQuery, RecordsResponse, StatusRecord,
                },
                session::{
                    MeInfo, MethodMeta, ParamMeta, PublicSettings, TransportPreference, VersionInfo,
                },
            },
            value_object::{KomariPassword, KomariUrl, KomariUsername, SessionToken, TwoFactorCode},
        },
        infrastructure::{api_client::ApiClient, rpc_client::RpcClient},
    },
    fleet::{
        orchestrator::{AppStatus, ConnectionOrchestrator, FleetBackend},
        store::FleetStore,
    },
    rpc::komari_rpc::KomariRpc,
};

use crate::{
    auth::application::service::login_service::LoginService,
    core::infrastructure::rpc_client::SharedSession,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::sync::{RwLock, broadcast};
use url::Url;

/// A client for a Komari monitoring backend.
///
/// It bundles the JSON-RPC transport, the typed RPC methods and the REST
/// endpoints used around login. Both sides share one session cookie.
///
/// # Examples
///
/// ```no_run
/// use komari_client::{KomariClient, KomariResult};
///
/// #[tokio::main]
/// async fn main() -> KomariResult<()> {
///     let client = KomariClient::builder()
///         .base_url("https://status.example.com")
///         .credentials("admin", "password")
///         .build()?;
///
///     client.login().await?;
///     let nodes = client.rpc().nodes(None).await?;
///     println!("{} nodes", nodes.len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct KomariClient {
    api: ApiClient,
    rpc: KomariRpc,
    credentials: Option<Credentials>,
}

#[derive(Debug)]
struct Credentials {
    username: KomariUsername,
    password: KomariPassword,
    two_factor_code: Option<TwoFactorCode>,
}

/// Builder for KomariClient configuration
#[derive(Debug, Default)]
pub struct KomariClientBuilder {
    base_url: Option<String>,
    config: Option<ClientConfig>,
    username: Option<String>,
    password: Option<String>,
    two_factor_code: Option<String>,
}

impl KomariClientBuilder {
    /// Overrides the base URL of the configuration.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn two_factor_code(mut self, code: impl Into<String>) -> Self {
        self.two_factor_code = Some(code.into());
        self
    }

    /// Validates the settings and builds the client. No request is sent.
    ///
    /// # Errors
    /// Returns `KomariError::Validation` for a malformed URL or credentials
    /// and `KomariError::Config` for an unusable configuration.
    pub fn build(self) -> KomariResult<KomariClient> {
        let mut config = self.config.unwrap_or_default();
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        let url = KomariUrl::parse(&config.base_url)?;

        let credentials = match (self.username, self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: KomariUsername::new(username)?,
                password: KomariPassword::new(password)?,
                two_factor_code: self.two_factor_code.map(TwoFactorCode::new).transpose()?,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ValidationError::field("password", "Password is required").into());
            }
            (None, Some(_)) => {
                return Err(ValidationError::field("username", "Username is required").into());
            }
        };

        let session: SharedSession = Arc::new(RwLock::new(None));
        let rpc = RpcClient::new(&url, &config, Arc::clone(&session))?;
        let api = ApiClient::new(url, &config, session)?;

        Ok(KomariClient {
            api,
            rpc: KomariRpc::new(rpc),
            credentials,
        })
    }
}

impl KomariClient {
    /// Creates a new builder for KomariClient configuration
    pub fn builder() -> KomariClientBuilder {
        KomariClientBuilder::default()
    }

    /// Builds a client from a loaded configuration without credentials.
    pub fn from_config(config: &ClientConfig) -> KomariResult<Self> {
        Self::builder().config(config.clone()).build()
    }

    /// Logs in with the credentials given to the builder.
    ///
    /// The session cookie is used by every later REST and HTTP RPC call. An
    /// already open socket keeps its old handshake; call
    /// [`ConnectionOrchestrator::reconnect_after_login`] to reopen it.
    ///
    /// # Errors
    /// - `KomariError::Validation` if the client has no credentials
    /// - `KomariError::Authentication` if the backend rejects them
    pub async fn login(&self) -> KomariResult<SessionToken> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            KomariError::from(ValidationError::field("credentials", "No credentials configured"))
        })?;
        let service = LoginService::new(
            credentials.username.clone(),
            credentials.password.clone(),
            credentials.two_factor_code.clone(),
        );
        service.execute(&self.api).await
    }

    /// Returns true if a session token is held.
    pub async fn is_authenticated(&self) -> bool {
        self.api.session().await.is_some()
    }

    /// Returns the current session token if authenticated
    pub async fn session_token(&self) -> Option<SessionToken> {
        self.api.session().await
    }

    /// Uses a session token obtained elsewhere, e.g. from a stored cookie.
    pub async fn set_session_token(&self, token: SessionToken) {
        self.api.set_session(token).await;
    }

    /// Forgets the session locally. The backend session ends at
    /// [`logout_url`](Self::logout_url).
    pub async fn clear_session(&self) {
        self.api.clear_session().await;
    }

    /// Browser URL that ends the session on the backend.
    pub fn logout_url(&self) -> Url {
        self.api.endpoint("logout")
    }

    /// Browser URL that starts the OAuth login flow.
    pub fn oauth_url(&self) -> Url {
        self.api.endpoint("oauth")
    }

    /// `GET /api/public`
    pub async fn public_settings(&self) -> KomariResult<PublicSettings> {
        self.api.get("public").await
    }

    /// `GET /api/me`
    pub async fn me(&self) -> KomariResult<MeInfo> {
        self.api.get_raw("me").await
    }

    /// `GET /api/version`
    pub async fn version(&self) -> KomariResult<VersionInfo> {
        self.api.get("version").await
    }

    pub fn rpc(&self) -> &KomariRpc {
        &self.rpc
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn url(&self) -> &KomariUrl {
        self.api.url()
    }
}

#[async_trait]
impl FleetBackend for KomariClient {
    async fn ping(&self) -> RpcResult<String> {
        self.rpc.ping().await
    }

    async fn public_settings(&self) -> KomariResult<PublicSettings> {
        KomariClient::public_settings(self).await
    }

    async fn me(&self) -> KomariResult<MeInfo> {
        KomariClient::me(self).await
    }

    async fn nodes(&self) -> RpcResult<NodeDescriptors> {
        self.rpc.nodes(None).await
    }

    async fn latest_statuses(&self) -> RpcResult<NodeStatuses> {
        self.rpc.latest_statuses().await
    }

    fn set_transport_mode(&self, use_socket: bool) {
        self.rpc.client().set_transport_mode(use_socket);
    }

    async fn ensure_connected_verified(&self, timeout: Duration) -> RpcResult<()> {
        self.rpc.client().ensure_connected_verified(timeout).await
    }

    fn close(&self) {
        self.rpc.client().close();
    }

    fn socket_generation(&self) -> Option<u64> {
        self.rpc.client().socket_generation()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.rpc.client().subscribe()
    }
}

/// Builds a client and an orchestrator for `config`.
///
/// Nothing is sent until [`ConnectionOrchestrator::init`] runs. End the
/// session with [`ConnectionOrchestrator::dispose`].
///
/// # Examples
///
/// ```no_run
/// use komari_client::{KomariConfig, KomariResult};
///
/// #[tokio::main]
/// async fn main() -> KomariResult<()> {
///     let config = KomariConfig::from_env()?;
///     let orchestrator = komari_client::create(&config)?;
///     orchestrator.init().await?;
///     println!("{} nodes online", orchestrator.store().online_count());
///     orchestrator.dispose();
///     Ok(())
/// }
/// ```
pub fn create(config: &KomariConfig) -> KomariResult<ConnectionOrchestrator<KomariClient>> {
    config.validate()?;
    let client = KomariClient::from_config(&config.client)?;
    ConnectionOrchestrator::new(Arc::new(client), config.orchestrator.clone())
}

#[cfg(test)]
mod tests;
