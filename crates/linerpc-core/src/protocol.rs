//! JSON-RPC message definitions
//!
//! The dialect is deliberately loose: peers may omit `jsonrpc`, `params` and `id`, and
//! the `error` member of a response may be any JSON value, not only the structured
//! `{code, message, data}` object.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: RequestId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: RequestId,
}

/// Request ID (string, number, or null)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    #[default]
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The `error` member of a response.
///
/// Servers built on other libraries are free to put any value there, so anything that
/// is not a well-formed error object is kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ErrorObject {
    Structured(JsonRpcError),
    Other(Value),
}

/// What a decoded response actually says.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
    /// Well-formed JSON carrying neither `result` nor `error`.
    Empty,
}

/// A `result` key that is present with a `null` value must still count as present.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A reply id that is not a string, an integer or null is read as null rather than
/// failing the whole response.
fn lenient_id<'de, D>(deserializer: D) -> Result<RequestId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl JsonRpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const SERVER_ERROR: i32 = -32000;

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: Self::PARSE_ERROR,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_REQUEST,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: Self::METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_PARAMS,
            message: message.into(),
            data: None,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            code: Self::INTERNAL_ERROR,
            message: message.into(),
            data: None,
        }
    }

    pub fn application_error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorObject::Structured(error) => fmt::Display::fmt(error, f),
            ErrorObject::Other(value) => write!(f, "{}", value),
        }
    }
}

impl ErrorObject {
    /// JSON-RPC error code, if the peer sent a structured error.
    pub fn code(&self) -> Option<i32> {
        match self {
            ErrorObject::Structured(error) => Some(error.code),
            ErrorObject::Other(_) => None,
        }
    }
}

impl From<JsonRpcError> for ErrorObject {
    fn from(error: JsonRpcError) -> Self {
        ErrorObject::Structured(error)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{:?}", s),
            RequestId::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: None,
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), JsonRpcError> {
        if let Some(version) = &self.jsonrpc {
            if version != JSONRPC_VERSION {
                return Err(JsonRpcError::invalid_request("Invalid JSON-RPC version"));
            }
        }
        if self.method.is_empty() {
            return Err(JsonRpcError::invalid_request("Method name cannot be empty"));
        }
        Ok(())
    }
}

impl Response {
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: impl Into<ErrorObject>, id: RequestId) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
            id,
        }
    }

    /// Classify the response. An `error` member wins over a `result` member.
    pub fn into_outcome(self) -> Outcome {
        match (self.result, self.error) {
            (_, Some(error)) => Outcome::Error(error),
            (Some(result), None) => Outcome::Result(result),
            (None, None) => Outcome::Empty,
        }
    }
}
