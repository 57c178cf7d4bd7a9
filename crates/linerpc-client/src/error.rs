//! Client error types

use linerpc_core::{ErrorObject, RequestId};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which part of a call ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Send,
    Read,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Connect => "Connect",
            Stage::Send => "Send",
            Stage::Read => "Read",
        })
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    /// Could not resolve or connect to the server.
    #[error("Failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The request could not be written in full.
    #[error("Failed to send request: {0}")]
    Send(#[source] std::io::Error),

    #[error("Failed to read reply: {0}")]
    Read(#[source] std::io::Error),

    /// The server closed the connection without replying.
    #[error("Connection closed before a reply arrived")]
    Closed,

    /// The reply was not valid JSON.
    #[error("Malformed reply: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] linerpc_core::Error),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
}

/// A well-formed reply that does not carry a usable result.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The server answered with an error, unknown methods included.
    #[error("Server returned an error: {0}")]
    Remote(ErrorObject),

    #[error("Reply carries neither a result nor an error")]
    EmptyResponse,

    #[error("Reply id {got} does not match request id {expected}")]
    IdMismatch { expected: RequestId, got: RequestId },

    #[error("Reply exceeds maximum size of {limit} bytes")]
    Oversized { limit: usize },
}

impl RpcError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }

    /// The error object the server sent back, if that is what went wrong.
    pub fn remote_error(&self) -> Option<&ErrorObject> {
        match self {
            RpcError::Protocol(ProtocolError::Remote(error)) => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
