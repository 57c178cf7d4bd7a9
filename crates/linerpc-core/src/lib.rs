//! linerpc core
//!
//! Wire types, message codec and stream framing shared by the server and the client,
//! plus configuration.

pub mod codec;
pub mod config;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod storage;

pub use error::{Error, Result};
pub use framing::{FrameError, JsonLineCodec};
pub use protocol::{ErrorObject, JsonRpcError, Outcome, Request, RequestId, Response};
