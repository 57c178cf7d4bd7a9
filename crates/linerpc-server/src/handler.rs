//! Handler contract for registered methods

use linerpc_core::{JsonRpcError, RequestId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Opaque value attached to a method at registration time and handed back to the
/// handler on every call.
pub type MethodContext = Arc<dyn Any + Send + Sync>;

/// Handler error
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("{message}")]
    Failed {
        code: i32,
        message: String,
        data: Option<Value>,
    },
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            code: JsonRpcError::SERVER_ERROR,
            message: message.into(),
            data: None,
        }
    }

    pub fn into_rpc_error(self) -> JsonRpcError {
        match self {
            HandlerError::InvalidParams(message) => {
                JsonRpcError::invalid_params(format!("Invalid params: {}", message))
            }
            HandlerError::Failed {
                code,
                message,
                data,
            } => JsonRpcError {
                code,
                message,
                data,
            },
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::InvalidParams(err.to_string())
    }
}

/// Deserialize `params` into the shape a handler expects.
///
/// Named parameters map onto a struct, positional ones onto a tuple struct. Absent
/// params and any shape mismatch come back as [`HandlerError::InvalidParams`].
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, HandlerError> {
    if params.is_null() {
        return Err(HandlerError::InvalidParams("Missing params".to_string()));
    }
    Ok(serde_json::from_value(params)?)
}

/// Everything a handler may want to know about the call besides its params.
pub struct CallContext {
    method: String,
    id: RequestId,
    peer: Option<SocketAddr>,
    data: Option<MethodContext>,
}

impl CallContext {
    pub fn new(
        method: impl Into<String>,
        id: RequestId,
        peer: Option<SocketAddr>,
        data: Option<MethodContext>,
    ) -> Self {
        Self {
            method: method.into(),
            id,
            peer,
            data,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// The registration context, if one was attached and it is a `T`.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("method", &self.method)
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// A registered method.
///
/// Handlers run synchronously, one call at a time per connection. They must not block
/// indefinitely and should report bad input as a [`HandlerError`] rather than panic.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: &CallContext, params: Value) -> Result<Value, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&CallContext, Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn call(&self, ctx: &CallContext, params: Value) -> Result<Value, HandlerError> {
        self(ctx, params)
    }
}
