use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use linerpc_core::codec;
use linerpc_core::{FrameError, JsonLineCodec, JsonRpcError, Request, RequestId, Response};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] linerpc_core::Error),

    #[error("Request exceeds maximum size of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Connection closed")]
    Closed,
}

impl From<FrameError> for ConnectionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => ConnectionError::Io(e),
            FrameError::TooLarge { limit } => ConnectionError::TooLarge { limit },
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

/// One frame read from the client.
#[derive(Debug)]
pub enum Incoming {
    Request(Request),
    /// The frame was not a usable request; `error` is what the client should be told.
    Invalid { error: JsonRpcError, id: RequestId },
}

/// The server side of a single accepted TCP connection.
pub struct Connection {
    framed: Framed<TcpStream, JsonLineCodec>,
    peer: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, max_message_size: usize) -> Self {
        Self {
            framed: Framed::new(stream, JsonLineCodec::with_max_length(max_message_size)),
            peer,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Wait for the next request. Blank lines between requests are ignored.
    pub async fn read_request(&mut self) -> Result<Incoming> {
        loop {
            let frame = match self.framed.next().await {
                Some(frame) => frame?,
                None => return Err(ConnectionError::Closed),
            };

            if frame.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Ok(match codec::decode_request(&frame) {
                Ok(request) => Incoming::Request(request),
                Err((error, id)) => Incoming::Invalid { error, id },
            });
        }
    }

    pub async fn write_response(&mut self, response: &Response) -> Result<()> {
        let bytes = codec::encode_response(response)?;
        self.framed.send(bytes).await?;
        Ok(())
    }
}
