//! Site and session models: public settings, current user, version and
//! method metadata.

use crate::core::domain::value_object::serde_helpers::null_as_default;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current-session identity as reported by `/api/me`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MeInfo {
    pub logged_in: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(rename = "2fa_enabled", skip_serializing_if = "Option::is_none")]
    pub two_factor_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// How the theme asks the dashboard to reach the RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportPreference {
    #[default]
    WebSocket,
    Http,
}

/// Public site settings from `/api/public`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PublicSettings {
    pub allow_cors: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_body: String,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_head: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    pub disable_password_login: bool,
    pub oauth_enable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_provider: Option<String>,
    /// Hours of ping history kept by the backend.
    pub ping_record_preserve_time: u64,
    pub private_site: bool,
    pub record_enabled: bool,
    /// Hours of load history kept by the backend.
    pub record_preserve_time: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub sitename: String,
    #[serde(deserialize_with = "null_as_default")]
    pub theme: String,
    #[serde(deserialize_with = "null_as_default")]
    pub theme_settings: Map<String, Value>,
}

impl PublicSettings {
    /// Reads `theme_settings.rpcTransportMode`, defaulting to WebSocket for
    /// anything other than an explicit `"http"`.
    pub fn transport_preference(&self) -> TransportPreference {
        match self.theme_settings.get("rpcTransportMode").and_then(Value::as_str) {
            Some("http") => TransportPreference::Http,
            _ => TransportPreference::WebSocket,
        }
    }
}

/// Backend version information.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VersionInfo {
    pub version: String,
    pub hash: String,
}

/// Metadata of an RPC method as listed by `rpc.getHelp`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MethodMeta {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub params: Vec<ParamMeta>,
    pub returns: String,
}

/// Metadata of a single RPC method parameter.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ParamMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}
