//! Built-in methods

use serde::Deserialize;
use serde_json::{json, Value};

use crate::handler::{parse_params, CallContext, HandlerError};
use crate::registry::MethodRegistry;

pub const SAY_HELLO: &str = "sayHello";
pub const ADD: &str = "add";

#[derive(Debug, Deserialize)]
struct SayHelloParams {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AddParams(i64, i64);

/// `sayHello({name})` -> `"Hello, <name>"`
pub fn say_hello(_ctx: &CallContext, params: Value) -> Result<Value, HandlerError> {
    let params: SayHelloParams = parse_params(params)?;
    Ok(json!(format!("Hello, {}", params.name)))
}

/// `add([a, b])` -> `a + b` over signed 64-bit integers
pub fn add(_ctx: &CallContext, params: Value) -> Result<Value, HandlerError> {
    let AddParams(a, b) = parse_params(params)?;
    let sum = a
        .checked_add(b)
        .ok_or_else(|| HandlerError::InvalidParams(format!("{} + {} overflows", a, b)))?;
    Ok(json!(sum))
}

pub fn register_builtin(registry: &mut MethodRegistry) {
    registry.register(SAY_HELLO, say_hello).register(ADD, add);
}
