use serde::Serialize;
use std::fmt;

/// Socket acquisition state as driven by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Emitted by the transport whenever the socket opens or closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// A new socket finished its handshake.
    Opened { generation: u64 },
    /// A socket went away. `remote` is false when the client closed it itself.
    Closed { generation: u64, remote: bool },
}

/// One-shot advisories for the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The first socket attempt failed and reconnection has started.
    ReconnectAdvisory,
    /// Reconnect attempts are exhausted; the session now polls over HTTP.
    FallbackToHttp,
    /// Polling over HTTP failed repeatedly.
    ConnectionError,
}
