//! Client and orchestrator configuration.
//!
//! Every field has a default, so a configuration file only needs the keys it
//! changes. Durations are written as milliseconds.

use crate::{
    KomariError, KomariResult,
    core::domain::value_object::{serde_helpers::duration_millis, validate_url},
};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::debug;

const ENV_BASE_URL: &str = "KOMARI_BASE_URL";
const ENV_REQUEST_TIMEOUT_MS: &str = "KOMARI_REQUEST_TIMEOUT_MS";
const ENV_POLL_INTERVAL_MS: &str = "KOMARI_POLL_INTERVAL_MS";

/// Rate limit applied to outbound HTTP calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Settings of the transport layer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the Komari backend.
    pub base_url: String,
    /// Timeout of a single call, on either transport.
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    /// Accept self-signed certificates on HTTPS endpoints.
    pub accept_invalid_certs: bool,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:25774".to_string(),
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
            rate_limit: None,
        }
    }
}

/// Timing and thresholds of the connection orchestrator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Delay before each socket reconnect attempt.
    #[serde(with = "duration_millis")]
    pub reconnect_interval: Duration,
    /// Failed reconnects before falling back to HTTP for the session.
    pub max_reconnect_attempts: u32,
    /// Period of the polling loop.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    /// Timeout of the startup liveness check.
    #[serde(with = "duration_millis")]
    pub health_check_timeout: Duration,
    /// Timeout of opening and verifying the socket.
    #[serde(with = "duration_millis")]
    pub socket_verify_timeout: Duration,
    /// Consecutive failed polls in HTTP fallback before flagging a
    /// connection error.
    pub failure_threshold: u32,
    /// Try the socket at all; `false` polls over HTTP from the start.
    pub prefer_socket: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(3000),
            max_reconnect_attempts: 5,
            poll_interval: Duration::from_millis(1000),
            health_check_timeout: Duration::from_millis(5000),
            socket_verify_timeout: Duration::from_millis(10000),
            failure_threshold: 3,
            prefer_socket: true,
        }
    }
}

/// Complete configuration of a Komari client session.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct KomariConfig {
    pub client: ClientConfig,
    pub orchestrator: OrchestratorConfig,
}

impl KomariConfig {
    /// Loads a JSON configuration file, applies environment overrides and
    /// validates the result.
    ///
    /// # Errors
    /// Returns `KomariError::Io` if the file cannot be read and
    /// `KomariError::Config` if it is malformed or inconsistent.
    pub async fn from_file(path: impl AsRef<Path>) -> KomariResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let mut config: KomariConfig = serde_json::from_str(&raw).map_err(|e| {
            KomariError::Config(format!("Invalid configuration in {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Loaded configuration file");
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> KomariResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `KOMARI_BASE_URL`, `KOMARI_REQUEST_TIMEOUT_MS` and
    /// `KOMARI_POLL_INTERVAL_MS` when they are set.
    pub fn apply_env(&mut self) -> KomariResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> KomariResult<()> {
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.client.base_url = base_url;
        }
        if let Some(millis) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            self.client.request_timeout = parse_millis(ENV_REQUEST_TIMEOUT_MS, &millis)?;
        }
        if let Some(millis) = lookup(ENV_POLL_INTERVAL_MS) {
            self.orchestrator.poll_interval = parse_millis(ENV_POLL_INTERVAL_MS, &millis)?;
        }
        Ok(())
    }

    /// Checks the invariants the client relies on.
    pub fn validate(&self) -> KomariResult<()> {
        validate_url(&self.client.base_url)?;
        if self.client.request_timeout.is_zero() {
            return Err(KomariError::Config("request_timeout must be positive".to_string()));
        }
        if let Some(rate_limit) = self.client.rate_limit {
            if rate_limit.requests_per_second == 0 || rate_limit.burst_size == 0 {
                return Err(KomariError::Config(
                    "rate_limit values must be greater than 0".to_string(),
                ));
            }
        }
        self.orchestrator.validate()
    }
}

impl OrchestratorConfig {
    /// Checks the timing values the background loops rely on.
    pub fn validate(&self) -> KomariResult<()> {
        if self.poll_interval.is_zero() {
            return Err(KomariError::Config("poll_interval must be positive".to_string()));
        }
        if self.failure_threshold == 0 {
            return Err(KomariError::Config(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_millis(key: &str, value: &str) -> KomariResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| KomariError::Config(format!("{} must be milliseconds: {}", key, e)))
}
