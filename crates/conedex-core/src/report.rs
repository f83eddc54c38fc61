//! JSON responses for batch outcomes

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::BatchError;
use crate::result::BatchResult;

pub const STATUS_OK: u16 = 200;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Map a top-level batch outcome to an HTTP status and JSON body.
///
/// A call that returned is `200` with the serialized [`BatchResult`], even
/// when some items failed. A setup error is `500` with `{"error": message}`.
pub fn respond<T, R>(outcome: &Result<BatchResult<T, R>, BatchError>) -> (u16, Value)
where
    T: Serialize,
    R: Serialize,
{
    match outcome {
        Ok(result) => match serde_json::to_value(result) {
            Ok(body) => (STATUS_OK, body),
            Err(e) => error_body(format!("failed to serialize result: {e}")),
        },
        Err(e) => error_body(e.to_string()),
    }
}

fn error_body(message: String) -> (u16, Value) {
    (STATUS_INTERNAL_ERROR, json!({ "error": message }))
}
