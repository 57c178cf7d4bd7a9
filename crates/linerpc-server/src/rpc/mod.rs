//! TCP server engine

pub mod connection;
pub mod server;

pub use connection::{Connection, ConnectionError, Incoming};
pub use server::{RpcServer, RpcServerError};
