//! JSON-RPC 2.0 framing.
//!
//! Outbound requests are plain serializable structs. Inbound payloads go
//! through [`decode_response`] exactly once, at the transport boundary, and
//! come out as a [`ResponseFrame`] whose outcome is either the raw result or
//! an [`RpcError`]. Anything that is not a well-formed response is rejected
//! there, so callers never inspect raw JSON.

use crate::core::domain::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const JSONRPC_VERSION: &str = "2.0";

/// An outbound call.
#[derive(Debug, Serialize)]
pub(crate) struct RequestFrame<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a P>,
    id: u64,
}

impl<'a, P: Serialize> RequestFrame<'a, P> {
    pub(crate) fn new(id: u64, method: &'a str, params: Option<&'a P>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id,
        }
    }
}

/// Identifier echoed back by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResponseId {
    Number(u64),
    Text(String),
}

impl ResponseId {
    /// The numeric id this response correlates to, if any.
    ///
    /// Ids are always issued as integers; a string id only matches when it
    /// is the decimal form of one.
    pub(crate) fn as_request_id(&self) -> Option<u64> {
        match self {
            ResponseId::Number(id) => Some(*id),
            ResponseId::Text(text) => text.parse().ok(),
        }
    }
}

/// A decoded response. `id == None` marks a notification without a caller.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResponseFrame {
    pub(crate) id: Option<ResponseId>,
    pub(crate) outcome: Result<Value, RpcError>,
}

/// Why a payload was not a valid response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MalformedResponse(pub(crate) String);

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Decodes one response payload.
pub(crate) fn decode_response(payload: &str) -> Result<ResponseFrame, MalformedResponse> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| MalformedResponse(format!("invalid JSON: {}", e)))?;
    decode_response_value(value)
}

pub(crate) fn decode_response_value(value: Value) -> Result<ResponseFrame, MalformedResponse> {
    let Value::Object(mut object) = value else {
        return Err(MalformedResponse("response is not an object".to_string()));
    };

    let id = match object.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => match number.as_u64() {
            Some(id) => Some(ResponseId::Number(id)),
            None => return Err(MalformedResponse(format!("unsupported id {}", number))),
        },
        Some(Value::String(text)) => Some(ResponseId::Text(text)),
        Some(other) => return Err(MalformedResponse(format!("unsupported id {}", other))),
    };

    if let Some(error) = object.remove("error") {
        let error: ErrorObject = serde_json::from_value(error)
            .map_err(|e| MalformedResponse(format!("invalid error object: {}", e)))?;
        return Ok(ResponseFrame {
            id,
            outcome: Err(RpcError::backend(error.code, error.message, error.data)),
        });
    }

    match object.remove("result") {
        Some(result) => Ok(ResponseFrame {
            id,
            outcome: Ok(result),
        }),
        None => Err(MalformedResponse(
            "response carries neither result nor error".to_string(),
        )),
    }
}
