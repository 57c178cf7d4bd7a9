//! linerpc Client Library
//!
//! Issues JSON-RPC calls against a linerpc server over TCP. Every call opens its own
//! connection, sends one request, waits for the matching reply and closes the
//! connection again; there is never more than one request in flight per socket.

pub mod error;

pub use error::{ProtocolError, Result, RpcError, Stage};

use bytes::Bytes;
use futures::{SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use linerpc_core::codec;
use linerpc_core::config::ClientConfig;
use linerpc_core::{FrameError, JsonLineCodec, Outcome, RequestId};

/// linerpc client
pub struct RpcClient {
    addr: String,
    max_message_size: usize,
    connect_timeout: Duration,
    send_timeout: Duration,
    read_timeout: Duration,
    request_counter: AtomicI64,
}

impl RpcClient {
    /// Create a client for `addr` (`host:port`) with default limits and timeouts.
    pub fn new(addr: impl Into<String>) -> Self {
        let defaults = ClientConfig::default();
        Self {
            addr: addr.into(),
            max_message_size: defaults.max_message_size,
            connect_timeout: defaults.connect_timeout(),
            send_timeout: defaults.send_timeout(),
            read_timeout: defaults.read_timeout(),
            request_counter: AtomicI64::new(1),
        }
    }

    pub fn with_config(config: &ClientConfig) -> Self {
        Self {
            addr: config.addr(),
            max_message_size: config.max_message_size,
            connect_timeout: config.connect_timeout(),
            send_timeout: config.send_timeout(),
            read_timeout: config.read_timeout(),
            request_counter: AtomicI64::new(1),
        }
    }

    /// Create a client after checking that `addr` resolves.
    pub async fn dial(addr: impl Into<String>) -> Result<Self> {
        let client = Self::new(addr);
        let resolved = timeout(client.connect_timeout, tokio::net::lookup_host(&client.addr))
            .await
            .map_err(|_| RpcError::Timeout {
                stage: Stage::Connect,
                after: client.connect_timeout,
            })?
            .map_err(|source| RpcError::Dial {
                addr: client.addr.clone(),
                source,
            })?;

        if resolved.count() == 0 {
            return Err(RpcError::Dial {
                addr: client.addr.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "address resolved to nothing",
                ),
            });
        }
        Ok(client)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Get next request ID
    fn next_id(&self) -> RequestId {
        let id = self.request_counter.fetch_add(1, Ordering::SeqCst);
        RequestId::String(id.to_string())
    }

    async fn connect(&self) -> Result<TcpStream> {
        timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| RpcError::Timeout {
                stage: Stage::Connect,
                after: self.connect_timeout,
            })?
            .map_err(|source| RpcError::Dial {
                addr: self.addr.clone(),
                source,
            })
    }

    /// Call `method` with `params` and return its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id();
        let request = codec::encode_request(method, &params, &id)?;

        let stream = self.connect().await?;
        let mut framed = Framed::new(stream, JsonLineCodec::with_max_length(self.max_message_size));
        tracing::debug!("Calling {} on {} (id {})", method, self.addr, id);

        timeout(self.send_timeout, framed.send(request))
            .await
            .map_err(|_| RpcError::Timeout {
                stage: Stage::Send,
                after: self.send_timeout,
            })?
            .map_err(RpcError::Send)?;

        let frame = timeout(self.read_timeout, read_reply(&mut framed))
            .await
            .map_err(|_| RpcError::Timeout {
                stage: Stage::Read,
                after: self.read_timeout,
            })??;

        let response = codec::decode_response(&frame).map_err(RpcError::Decode)?;
        if response.id != RequestId::Null && response.id != id {
            return Err(ProtocolError::IdMismatch {
                expected: id,
                got: response.id,
            }
            .into());
        }

        match response.into_outcome() {
            Outcome::Result(result) => Ok(result),
            Outcome::Error(error) => Err(ProtocolError::Remote(error).into()),
            Outcome::Empty => Err(ProtocolError::EmptyResponse.into()),
        }
    }

    /// Call `sayHello` and return the greeting.
    pub async fn say_hello(&self, name: &str) -> Result<String> {
        let result = self.call("sayHello", json!({ "name": name })).await?;
        serde_json::from_value(result).map_err(RpcError::Decode)
    }

    /// Call `add` and return the sum.
    pub async fn add(&self, a: i64, b: i64) -> Result<i64> {
        let result = self.call("add", json!([a, b])).await?;
        serde_json::from_value(result).map_err(RpcError::Decode)
    }
}

/// One-shot call without keeping a client around.
pub async fn call(addr: &str, method: &str, params: Value) -> Result<Value> {
    RpcClient::new(addr).call(method, params).await
}

/// Read frames until the reply shows up.
///
/// Some servers deliver a bare line terminator ahead of the reply. A frame that held
/// nothing but the terminator is skipped; anything else, a line of spaces included, is
/// taken as the reply.
async fn read_reply<S>(frames: &mut S) -> Result<Bytes>
where
    S: Stream<Item = std::result::Result<Bytes, FrameError>> + Unpin,
{
    loop {
        let frame = match frames.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(FrameError::Io(e))) => return Err(RpcError::Read(e)),
            Some(Err(FrameError::TooLarge { limit })) => {
                return Err(ProtocolError::Oversized { limit }.into())
            }
            None => return Err(RpcError::Closed),
        };

        if frame.is_empty() {
            tracing::trace!("Skipping blank line ahead of reply");
            continue;
        }
        return Ok(frame);
    }
}
