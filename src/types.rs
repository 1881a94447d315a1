//! Envelope types for the sandbox service's JSON responses.
//!
//! The transport core does not enforce these shapes; they are the deserialization targets
//! callers typically hand to [`crate::Client::get`] and friends.

use serde::{Deserialize, Serialize};
/// Untyped JSON value, used for free-form `data` and `result` fields.
pub use serde_json::Value;

/// Successful response envelope: `{"status": "...", "result": ...}`.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ApiResponse<T> {
    pub status: String,
    pub result: T,
}

/// Failed response envelope: `{"status": "...", "error": {"code", "message", "data"?}}`.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ApiErrorResponse {
    pub status: String,
    pub error: ApiError,
}

#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
