#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod client;
pub mod error;
pub mod relay;
pub(crate) mod serde_helpers;
pub mod types;

use std::borrow::Cow;

pub use client::{Client, Config, Transport};
/// Cancellation signal accepted by every [`Client`] operation.
pub use tokio_util::sync::CancellationToken;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The only media type the transport core accepts from the service.
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Upper bound, in bytes, on how much of a response body is logged or rendered in an error
/// message.
pub const BODY_PREVIEW_LIMIT: usize = 512;

/// Truncate `body` to [`BODY_PREVIEW_LIMIT`] bytes on a char boundary, noting the full size
/// when anything was cut.
pub(crate) fn body_preview(body: &str) -> Cow<'_, str> {
    if body.len() <= BODY_PREVIEW_LIMIT {
        return Cow::Borrowed(body);
    }

    let mut end = BODY_PREVIEW_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let head = body.get(..end).unwrap_or_default();

    Cow::Owned(format!("{head}…({} bytes total)", body.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_is_borrowed() {
        let preview = body_preview(r#"{"status":"ok"}"#);

        assert!(matches!(preview, Cow::Borrowed(_)));
        assert_eq!(preview, r#"{"status":"ok"}"#);
    }

    #[test]
    fn long_body_is_truncated() {
        let body = "a".repeat(BODY_PREVIEW_LIMIT * 4);
        let preview = body_preview(&body);

        assert!(preview.starts_with(&"a".repeat(BODY_PREVIEW_LIMIT)));
        assert!(preview.ends_with("(2048 bytes total)"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 3-byte characters never align with the limit
        let body = "€".repeat(BODY_PREVIEW_LIMIT);
        let preview = body_preview(&body);

        let head = preview.split('…').next().unwrap_or_default();
        assert_eq!(head.len(), BODY_PREVIEW_LIMIT - BODY_PREVIEW_LIMIT % 3);
    }
}
