//! Envelope codec for the MCP app channel.
//!
//! The channel carries untyped JSON values. [`decode`] classifies one value
//! into a [`JsonRpcMessage`] using the member set alone:
//!
//! | `id` | `method` | envelope     |
//! |------|----------|--------------|
//! | yes  | yes      | Request      |
//! | yes  | no       | Response     |
//! | no   | yes      | Notification |
//! | no   | no       | parse failure|
//!
//! A Response must carry exactly one of `result` or `error`. Everything that
//! does not fit is reported as a [`ParseFailure`], which the session logs and
//! drops; it never reaches a facade caller.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::mcp::types::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    JSONRPC_VERSION,
};
use crate::utils::error::{McpError, McpResult};

/// Why an inbound value could not be classified
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailureKind {
    /// The raw text was not JSON at all
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// Batches are not part of this protocol
    #[error("batch messages are not supported")]
    Batch,
    /// The value was a scalar or null
    #[error("message is not a JSON object")]
    NotAnObject,
    /// `jsonrpc` was missing or not "2.0"
    #[error("unsupported jsonrpc version: {0}")]
    Version(String),
    /// `id` was present but neither a number nor a string
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// `method` was present but not a string
    #[error("invalid method: {0}")]
    InvalidMethod(String),
    /// `params` was present but neither an object nor an array
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// Neither `id` nor `method` was present
    #[error("message has neither id nor method")]
    Unclassifiable,
    /// A response carried both `result` and `error`
    #[error("response carries both result and error")]
    BothResultAndError,
    /// A response carried neither `result` nor `error`
    #[error("response carries neither result nor error")]
    NeitherResultNorError,
    /// `error` was not an object with a string `message`
    #[error("malformed error object: {0}")]
    MalformedError(String),
}

/// A malformed inbound message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct ParseFailure {
    /// What was wrong with the message
    pub kind: ParseFailureKind,
    /// The id, when one could be read, for diagnostics only
    pub id: Option<RequestId>,
}

impl ParseFailure {
    fn new(kind: ParseFailureKind) -> Self {
        Self { kind, id: None }
    }

    fn with_id(kind: ParseFailureKind, id: RequestId) -> Self {
        Self { kind, id: Some(id) }
    }
}

/// Serializes an envelope to the channel's native JSON value
pub fn encode(message: &JsonRpcMessage) -> McpResult<Value> {
    if let JsonRpcMessage::Response(response) = message {
        if response.result.is_some() == response.error.is_some() {
            return Err(McpError::Serialization(format!(
                "response {} must carry exactly one of result or error",
                response.id
            )));
        }
    }
    serde_json::to_value(message)
        .map_err(|e| McpError::Serialization(format!("Failed to serialize envelope: {}", e)))
}

/// Parses raw text (e.g. a socket frame) and classifies it
pub fn decode_str(text: &str) -> Result<JsonRpcMessage, ParseFailure> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ParseFailure::new(ParseFailureKind::InvalidJson(e.to_string())))?;
    decode(value)
}

/// Classifies one inbound JSON value
pub fn decode(value: Value) -> Result<JsonRpcMessage, ParseFailure> {
    let mut object = match value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(ParseFailure::new(ParseFailureKind::Batch)),
        _ => return Err(ParseFailure::new(ParseFailureKind::NotAnObject)),
    };

    match object.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(other) => {
            return Err(ParseFailure::new(ParseFailureKind::Version(other.to_string())));
        }
        None => {
            return Err(ParseFailure::new(ParseFailureKind::Version("<missing>".to_string())));
        }
    }

    let id = match object.remove("id") {
        None => None,
        Some(raw) => Some(parse_id(raw)?),
    };

    let method = match object.remove("method") {
        None => None,
        Some(Value::String(method)) => Some(method),
        Some(other) => {
            let kind = ParseFailureKind::InvalidMethod(other.to_string());
            return Err(match id {
                Some(id) => ParseFailure::with_id(kind, id),
                None => ParseFailure::new(kind),
            });
        }
    };

    match (id, method) {
        (Some(id), Some(method)) => {
            let params = take_params(&mut object).map_err(|k| ParseFailure::with_id(k, id.clone()))?;
            Ok(JsonRpcMessage::Request(JsonRpcRequest::new(&method, params, id)))
        }
        (Some(id), None) => decode_response(id, object),
        (None, Some(method)) => {
            let params = take_params(&mut object).map_err(ParseFailure::new)?;
            Ok(JsonRpcMessage::Notification(JsonRpcNotification::new(&method, params)))
        }
        (None, None) => Err(ParseFailure::new(ParseFailureKind::Unclassifiable)),
    }
}

fn parse_id(raw: Value) -> Result<RequestId, ParseFailure> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| ParseFailure::new(ParseFailureKind::InvalidId(n.to_string()))),
        Value::String(s) => Ok(RequestId::String(s)),
        other => Err(ParseFailure::new(ParseFailureKind::InvalidId(other.to_string()))),
    }
}

fn take_params(object: &mut Map<String, Value>) -> Result<Option<Value>, ParseFailureKind> {
    match object.remove("params") {
        None | Some(Value::Null) => Ok(None),
        Some(params @ (Value::Object(_) | Value::Array(_))) => Ok(Some(params)),
        Some(other) => Err(ParseFailureKind::InvalidParams(other.to_string())),
    }
}

fn decode_response(
    id: RequestId,
    mut object: Map<String, Value>,
) -> Result<JsonRpcMessage, ParseFailure> {
    let result = object.remove("result");
    let error = object.remove("error");

    match (result, error) {
        (Some(_), Some(_)) => Err(ParseFailure::with_id(ParseFailureKind::BothResultAndError, id)),
        (None, None) => Err(ParseFailure::with_id(ParseFailureKind::NeitherResultNorError, id)),
        (Some(result), None) => Ok(JsonRpcMessage::Response(JsonRpcResponse::success(result, id))),
        (None, Some(error)) => {
            if !error.get("message").map_or(false, Value::is_string) {
                return Err(ParseFailure::with_id(
                    ParseFailureKind::MalformedError(error.to_string()),
                    id,
                ));
            }
            let error = serde_json::from_value::<JsonRpcError>(error).map_err(|e| {
                ParseFailure::with_id(ParseFailureKind::MalformedError(e.to_string()), id.clone())
            })?;
            Ok(JsonRpcMessage::Response(JsonRpcResponse::error(error, id)))
        }
    }
}
