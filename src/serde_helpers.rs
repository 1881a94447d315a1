//! Typed decoding of response bodies.
//!
//! When the `tracing` feature is enabled, unknown fields are logged as warnings and a
//! failed decode logs the JSON path at which it failed, helping detect API drift.

use serde::de::DeserializeOwned;

/// Decode a JSON body into `T`, warning about fields `T` does not capture.
///
/// Unknown fields never cause the decode to fail.
#[cfg(feature = "tracing")]
pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> crate::Result<T> {
    use std::any::type_name;

    let mut unknown_paths: Vec<String> = Vec::new();
    let mut deserializer = serde_json::Deserializer::from_str(body);

    let result: T = serde_ignored::deserialize(&mut deserializer, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        let mut deserializer = serde_json::Deserializer::from_str(body);
        let tracked: Result<T, _> = serde_path_to_error::deserialize(&mut deserializer);
        if let Err(path_err) = tracked {
            tracing::error!(
                type_name = %type_name::<T>(),
                path = %path_err.path(),
                error = %path_err.inner(),
                "deserialization failed"
            );
        }
    })?;
    deserializer.end()?;

    for path in unknown_paths {
        tracing::warn!(
            type_name = %type_name::<T>(),
            field = %path,
            "unknown field in API response"
        );
    }

    Ok(result)
}

/// Pass-through decoding when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> crate::Result<T> {
    Ok(serde_json::from_str(body)?)
}
