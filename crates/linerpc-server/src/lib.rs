//! linerpc server library
//!
//! Method registry, handler contract and the TCP server engine, exposed as a library
//! so that other binaries and the integration tests can host their own methods.

pub mod handler;
pub mod methods;
pub mod registry;
pub mod rpc;

pub use handler::{parse_params, CallContext, Handler, HandlerError, MethodContext};
pub use registry::{MethodRegistry, Registration};
pub use rpc::{Connection, RpcServer};
