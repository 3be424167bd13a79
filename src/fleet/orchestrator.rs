//! Startup sequence, socket acquisition state machine and polling loop.
//!
//! The orchestrator is the single writer of the [`FleetStore`]. It owns two
//! background tasks:
//!
//! - the connection task, which opens and verifies the socket, watches it for
//!   remote closes and drives reconnects until the attempt budget is spent,
//!   after which the session permanently falls back to HTTP;
//! - the polling task, which refreshes descriptors and statuses on a fixed
//!   interval and counts failures while running over HTTP.

use crate::{
    KomariError, KomariResult,
    config::OrchestratorConfig,
    core::domain::{
        error::{RpcError, RpcResult},
        model::{
            connection_state::{ConnectionState, Notice, TransportEvent},
            node_descriptor::NodeDescriptors,
            node_status::NodeStatuses,
            session::{MeInfo, PublicSettings, TransportPreference},
        },
    },
    fleet::store::FleetStore,
};
use async_trait::async_trait;
use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

const NOTICE_CAPACITY: usize = 16;

/// Everything the orchestrator needs from the backend.
///
/// Implemented by [`KomariClient`](crate::KomariClient).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FleetBackend: Send + Sync + 'static {
    /// Liveness call; a healthy backend answers `"pong"`.
    async fn ping(&self) -> RpcResult<String>;
    async fn public_settings(&self) -> KomariResult<PublicSettings>;
    async fn me(&self) -> KomariResult<MeInfo>;
    /// Complete descriptor snapshot.
    async fn nodes(&self) -> RpcResult<NodeDescriptors>;
    /// Complete status snapshot.
    async fn latest_statuses(&self) -> RpcResult<NodeStatuses>;
    fn set_transport_mode(&self, use_socket: bool);
    async fn ensure_connected_verified(&self, timeout: Duration) -> RpcResult<()>;
    fn close(&self);
    /// Generation of the currently open socket, if any.
    fn socket_generation(&self) -> Option<u64>;
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Application-level status surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AppStatus {
    /// True until the startup sequence finished, successfully or not.
    pub loading: bool,
    /// Set when the backend is unreachable at startup or polling over HTTP
    /// keeps failing. Stays set for the rest of the session.
    pub connection_error: bool,
    pub public_settings: Option<PublicSettings>,
    pub me: Option<MeInfo>,
    pub logged_in: bool,
}

impl Default for AppStatus {
    fn default() -> Self {
        Self {
            loading: true,
            connection_error: false,
            public_settings: None,
            me: None,
            logged_in: false,
        }
    }
}

#[derive(Default)]
struct Tasks {
    connection: Option<JoinHandle<()>>,
    polling: Option<JoinHandle<()>>,
}

impl Tasks {
    fn replace_connection(&mut self, handle: Option<JoinHandle<()>>) {
        if let Some(previous) = std::mem::replace(&mut self.connection, handle) {
            previous.abort();
        }
    }

    fn replace_polling(&mut self, handle: Option<JoinHandle<()>>) {
        if let Some(previous) = std::mem::replace(&mut self.polling, handle) {
            previous.abort();
        }
    }
}

struct Inner<B> {
    backend: Arc<B>,
    config: OrchestratorConfig,
    store: RwLock<FleetStore>,
    status: RwLock<AppStatus>,
    notices: broadcast::Sender<Notice>,
    initialized: AtomicBool,
    /// True while the session runs the socket state machine. Decided at
    /// startup and after login; false once it polls over HTTP only.
    use_socket: AtomicBool,
    degraded: AtomicBool,
    poll_in_progress: AtomicBool,
    consecutive_failures: AtomicU32,
    tasks: Mutex<Tasks>,
}

/// Drives startup, the socket state machine and polling for one backend.
///
/// Cloning is cheap; clones control the same session.
pub struct ConnectionOrchestrator<B: FleetBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: FleetBackend> Clone for ConnectionOrchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: FleetBackend> ConnectionOrchestrator<B> {
    /// Creates an idle orchestrator. Nothing runs until [`init`](Self::init).
    ///
    /// # Errors
    /// Returns `KomariError::Config` if `config` fails validation.
    pub fn new(backend: Arc<B>, config: OrchestratorConfig) -> KomariResult<Self> {
        config.validate()?;
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                use_socket: AtomicBool::new(false),
                config,
                store: RwLock::new(FleetStore::new()),
                status: RwLock::new(AppStatus::default()),
                notices,
                initialized: AtomicBool::new(false),
                degraded: AtomicBool::new(false),
                poll_in_progress: AtomicBool::new(false),
                consecutive_failures: AtomicU32::new(0),
                tasks: Mutex::new(Tasks::default()),
            }),
        })
    }

    /// Runs the startup sequence and starts the connection and polling tasks.
    ///
    /// Calling it again on an initialized orchestrator is a no-op.
    ///
    /// # Errors
    /// - `KomariError::BackendUnavailable` if the liveness check fails
    /// - `KomariError::Rpc` if the initial node snapshot cannot be fetched
    ///
    /// Both set `loading` to false; the first also sets `connection_error`.
    pub async fn init(&self) -> KomariResult<()> {
        if self.inner.initialized.load(Ordering::SeqCst) {
            warn!("Orchestrator already initialized");
            return Ok(());
        }

        if let Err(e) = self.startup().await {
            error!(error = %e, "Initialization failed");
            self.inner.status_mut().loading = false;
            return Err(e);
        }

        self.inner.status_mut().loading = false;
        self.inner.initialized.store(true, Ordering::SeqCst);
        self.start_live_updates();
        info!("Initialization complete");
        Ok(())
    }

    async fn startup(&self) -> KomariResult<()> {
        self.health_check().await?;

        let settings = match self.inner.backend.public_settings().await {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(error = %e, "Failed to fetch public settings, using defaults");
                None
            }
        };
        let preference = settings
            .as_ref()
            .map(PublicSettings::transport_preference)
            .unwrap_or_default();
        self.inner.status_mut().public_settings = settings;

        self.inner.refresh_me().await;

        let (descriptors, statuses) = tokio::try_join!(
            self.inner.backend.nodes(),
            self.inner.backend.latest_statuses()
        )?;
        self.inner
            .store_mut()
            .initialize(&descriptors, Some(&statuses));

        let use_socket = self.inner.socket_allowed(preference);
        self.inner.use_socket.store(use_socket, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> KomariResult<()> {
        let result = tokio::time::timeout(
            self.inner.config.health_check_timeout,
            self.inner.backend.ping(),
        )
        .await
        .unwrap_or_else(|_| Err(RpcError::timeout()));

        let failure = match result {
            Ok(reply) if reply == "pong" => return Ok(()),
            Ok(reply) => format!("Unexpected health check response: {}", reply),
            Err(e) => e.to_string(),
        };
        error!(reason = %failure, "Health check failed");
        self.inner.status_mut().connection_error = true;
        Err(KomariError::BackendUnavailable(failure))
    }

    fn start_live_updates(&self) {
        if self.inner.use_socket.load(Ordering::SeqCst) {
            self.spawn_connection();
        } else {
            info!("Socket disabled, polling over HTTP");
            self.inner.backend.set_transport_mode(false);
        }

        let inner = Arc::clone(&self.inner);
        let polling = tokio::spawn(async move { inner.poll_loop().await });
        self.inner.tasks().replace_polling(Some(polling));
    }

    fn spawn_connection(&self) {
        let inner = Arc::clone(&self.inner);
        let connection = tokio::spawn(async move { inner.connection_loop().await });
        self.inner.tasks().replace_connection(Some(connection));
    }

    /// Runs one poll cycle now unless one is already in flight.
    ///
    /// Returns false if the cycle was skipped.
    pub async fn poll_once(&self) -> bool {
        self.inner.poll_once().await
    }

    /// Re-establishes the socket after an authentication change.
    ///
    /// Leaves degraded mode, resets the attempt counter, refreshes the
    /// identity and restarts the connection task. A site that asks for HTTP
    /// transport keeps polling over HTTP.
    pub async fn reconnect_after_login(&self) {
        self.inner.tasks().replace_connection(None);
        self.inner.backend.close();

        let preference = self
            .inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .public_settings
            .as_ref()
            .map(PublicSettings::transport_preference)
            .unwrap_or_default();
        let use_socket = self.inner.socket_allowed(preference);
        self.inner.use_socket.store(use_socket, Ordering::SeqCst);
        self.inner.degraded.store(false, Ordering::SeqCst);
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
        self.inner
            .store_mut()
            .update_connection_state(ConnectionState::Disconnected, Some(0));

        self.inner.refresh_me().await;

        if use_socket {
            info!("Reconnecting after login");
            self.spawn_connection();
        }
    }

    /// Stops the polling task. The socket, if any, stays up.
    pub fn stop_polling(&self) {
        self.inner.tasks().replace_polling(None);
    }

    /// Stops both tasks, closes the transport, clears the store and resets
    /// the application status.
    ///
    /// A later [`init`](Self::init) starts a fresh session.
    pub fn dispose(&self) {
        {
            let mut tasks = self.inner.tasks();
            tasks.replace_connection(None);
            tasks.replace_polling(None);
        }
        self.inner.backend.close();
        self.inner.store_mut().clear();
        *self.inner.status_mut() = AppStatus::default();
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
        self.inner.degraded.store(false, Ordering::SeqCst);
        self.inner.use_socket.store(false, Ordering::SeqCst);
        self.inner.initialized.store(false, Ordering::SeqCst);
        debug!("Orchestrator disposed");
    }

    /// Read access to the fleet. Do not hold the guard across an `.await`.
    pub fn store(&self) -> RwLockReadGuard<'_, FleetStore> {
        self.inner.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> AppStatus {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// True once reconnects were exhausted and the session polls over HTTP.
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }
}

impl<B: FleetBackend> Inner<B> {
    fn store_mut(&self) -> RwLockWriteGuard<'_, FleetStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_mut(&self) -> RwLockWriteGuard<'_, AppStatus> {
        self.status.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_connection_state(&self, state: ConnectionState, attempts: Option<u32>) {
        debug!(%state, ?attempts, "Connection state");
        self.store_mut().update_connection_state(state, attempts);
    }

    fn socket_allowed(&self, preference: TransportPreference) -> bool {
        self.config.prefer_socket && preference == TransportPreference::WebSocket
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    async fn refresh_me(&self) {
        match self.backend.me().await {
            Ok(me) => {
                let mut status = self.status_mut();
                status.logged_in = me.logged_in;
                status.me = Some(me);
            }
            Err(e) => warn!(error = %e, "Failed to fetch user info"),
        }
    }

    async fn connection_loop(self: Arc<Self>) {
        let mut attempts = 0;
        loop {
            if !self.use_socket.load(Ordering::SeqCst) {
                return;
            }

            // Subscribe before connecting so no close of the new socket is missed.
            let mut events = self.backend.subscribe();
            self.backend.set_transport_mode(true);
            self.set_connection_state(ConnectionState::Connecting, Some(attempts));

            match self
                .backend
                .ensure_connected_verified(self.config.socket_verify_timeout)
                .await
            {
                Ok(()) => {
                    attempts = 0;
                    self.set_connection_state(ConnectionState::Connected, Some(0));
                    info!("WebSocket connected");

                    let remote = match self.backend.socket_generation() {
                        Some(generation) => {
                            wait_for_close(&mut events, &*self.backend, generation).await
                        }
                        None => true,
                    };
                    self.set_connection_state(ConnectionState::Disconnected, None);
                    if !remote {
                        debug!("WebSocket closed locally, not reconnecting");
                        return;
                    }
                    warn!("WebSocket connection lost");
                }
                Err(e) => {
                    warn!(error = %e, attempts, "WebSocket connection failed");
                    self.set_connection_state(ConnectionState::Disconnected, None);
                }
            }

            if attempts >= self.config.max_reconnect_attempts {
                self.fall_back_to_http();
                return;
            }
            attempts += 1;
            self.set_connection_state(ConnectionState::Reconnecting, Some(attempts));
            if attempts == 1 {
                self.notify(Notice::ReconnectAdvisory);
            }

            tokio::time::sleep(self.config.reconnect_interval).await;
            self.backend.close();
        }
    }

    fn fall_back_to_http(&self) {
        error!(
            attempts = self.config.max_reconnect_attempts,
            "Max reconnect attempts reached, falling back to HTTP"
        );
        self.use_socket.store(false, Ordering::SeqCst);
        self.degraded.store(true, Ordering::SeqCst);
        self.set_connection_state(
            ConnectionState::Disconnected,
            Some(self.config.max_reconnect_attempts),
        );
        self.backend.set_transport_mode(false);
        self.backend.close();
        self.notify(Notice::FallbackToHttp);
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the snapshot was just fetched.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    async fn poll_once(&self) -> bool {
        if self.poll_in_progress.swap(true, Ordering::SeqCst) {
            debug!("Poll cycle still in flight, skipping tick");
            return false;
        }
        // Cleared on drop so an aborted cycle does not block later ones.
        let _in_progress = InProgress(&self.poll_in_progress);

        let result = tokio::try_join!(
            self.backend.ping(),
            self.backend.nodes(),
            self.backend.latest_statuses()
        );

        match result {
            Ok((_, descriptors, statuses)) => {
                let mut store = self.store_mut();
                store.update_descriptors(&descriptors);
                store.update_statuses(&statuses);
                drop(store);
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            Err(e) => {
                warn!(error = %e, "Poll failed");
                if !self.use_socket.load(Ordering::SeqCst) {
                    let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if failures >= self.config.failure_threshold {
                        error!(failures, "Polling over HTTP keeps failing");
                        let newly_set = {
                            let mut status = self.status_mut();
                            !std::mem::replace(&mut status.connection_error, true)
                        };
                        if newly_set {
                            self.notify(Notice::ConnectionError);
                        }
                    }
                }
            }
        }
        true
    }
}

struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Waits until the socket with `generation` closes; returns whether the
/// remote side closed it.
async fn wait_for_close<B: FleetBackend + ?Sized>(
    events: &mut broadcast::Receiver<TransportEvent>,
    backend: &B,
    generation: u64,
) -> bool {
    loop {
        match events.recv().await {
            Ok(TransportEvent::Closed {
                generation: closed,
                remote,
            }) if closed == generation => return remote,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Transport events lagged");
                if backend.socket_generation() != Some(generation) {
                    return true;
                }
            }
            Err(RecvError::Closed) => return false,
        }
    }
}
