//! Message codec: requests and responses to and from JSON bytes

use serde::Serialize;
use serde_json::Value;

use crate::protocol::{JsonRpcError, Request, RequestId, Response};
use crate::Result;

#[derive(Serialize)]
struct OutgoingRequest<'a> {
    method: &'a str,
    params: &'a Value,
    id: &'a RequestId,
}

/// Encode a request object. `params` is written as given (object or array).
pub fn encode_request(method: &str, params: &Value, id: &RequestId) -> Result<Vec<u8>> {
    let request = OutgoingRequest { method, params, id };
    Ok(serde_json::to_vec(&request)?)
}

/// Decode a request, mapping failures to the error the server should send back.
///
/// Bytes that are not JSON are a parse error. JSON that is not a request object is an
/// invalid request; its `id` is salvaged so the reply can still be correlated.
pub fn decode_request(bytes: &[u8]) -> std::result::Result<Request, (JsonRpcError, RequestId)> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        (
            JsonRpcError::parse_error(format!("Parse error: {}", e)),
            RequestId::Null,
        )
    })?;

    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok())
        .unwrap_or_default();

    if !value.is_object() {
        return Err((
            JsonRpcError::invalid_request("Request must be a JSON object"),
            id,
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| (JsonRpcError::invalid_request(format!("Invalid request: {}", e)), id))
}

pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(response)?)
}

/// Decode a response. Only malformed JSON (or JSON that is not an object) fails here;
/// a response with neither `result` nor `error` decodes fine and is classified as
/// [`crate::Outcome::Empty`].
pub fn decode_response(bytes: &[u8]) -> std::result::Result<Response, serde_json::Error> {
    serde_json::from_slice(bytes)
}
