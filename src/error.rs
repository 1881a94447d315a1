use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

/// HTTP method type, re-exported for use with error inspection.
pub use reqwest::Method;
/// HTTP status code type, re-exported for use with error inspection.
pub use reqwest::StatusCode;
use reqwest::header;
use serde::Deserialize as _;
use serde_json::Value;

use crate::body_preview;
use crate::types::ApiErrorResponse;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Invalid argument supplied by the caller, rejected before any network activity
    Validation,
    /// The server answered with a content type other than `application/json`
    NonJson,
    /// The server answered with a status outside of the success range
    Status,
    /// Network, DNS, connection or body-read failure
    Transport,
    /// The caller's cancellation token fired while the request was in flight
    Cancelled,
    /// The [`crate::Client`] was disposed before the call was made
    Disposed,
    /// Internal error from dependencies (serialization, deserialization)
    Internal,
}

/// The single error record surfaced by every operation in this crate.
///
/// Callers distinguish failures by [`Error::kind`] and, for response-level failures, by
/// [`Error::status_code`], [`Error::body`] and [`Error::payload`].
#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    /// Builds a [`Kind::Status`] error. Never fails: when `body` is not valid JSON the
    /// structured payload is simply absent.
    pub fn status<S: Into<String>>(
        status_code: StatusCode,
        method: Method,
        path: String,
        body: S,
    ) -> Self {
        let body = body.into();
        Status {
            status_code,
            method,
            path,
            payload: parse_payload(&body),
            body,
        }
        .into()
    }

    /// Builds a [`Kind::NonJson`] error carrying the actual status and raw body.
    pub fn non_json<S: Into<String>>(
        status_code: StatusCode,
        method: Method,
        path: String,
        content_type: Option<String>,
        body: S,
    ) -> Self {
        let body = body.into();
        NonJson {
            status_code,
            method,
            path,
            content_type,
            payload: parse_payload(&body),
            body,
        }
        .into()
    }

    #[must_use]
    pub fn cancelled(method: Method, path: &str) -> Self {
        Cancelled {
            method,
            path: path.to_owned(),
        }
        .into()
    }

    /// The HTTP status of the response that caused this error, or `None` when the failure
    /// happened before a response was received.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        if let Some(status) = self.downcast_ref::<Status>() {
            return Some(status.status_code);
        }
        self.downcast_ref::<NonJson>().map(|e| e.status_code)
    }

    /// The raw response body, possibly empty.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        if let Some(status) = self.downcast_ref::<Status>() {
            return Some(&status.body);
        }
        self.downcast_ref::<NonJson>().map(|e| e.body.as_str())
    }

    /// Best-effort JSON parse of the response body.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        if let Some(status) = self.downcast_ref::<Status>() {
            return status.payload.as_ref();
        }
        self.downcast_ref::<NonJson>()
            .and_then(|e| e.payload.as_ref())
    }

    /// Interprets [`Error::payload`] as the service's `{status, error: {code, message, data}}`
    /// error envelope, if it has that shape.
    #[must_use]
    pub fn api_error(&self) -> Option<ApiErrorResponse> {
        self.payload()
            .and_then(|value| ApiErrorResponse::deserialize(value).ok())
    }
}

fn parse_payload(body: &str) -> Option<Value> {
    serde_json::from_str(body).ok()
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A response whose status was outside of the success range.
#[non_exhaustive]
#[derive(Debug)]
pub struct Status {
    pub status_code: StatusCode,
    pub method: Method,
    pub path: String,
    pub body: String,
    pub payload: Option<Value>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request failed ({}) making {} call to {} with {}",
            self.status_code,
            self.method,
            self.path,
            body_preview(&self.body)
        )
    }
}

impl StdError for Status {}

/// A response whose declared content type was not `application/json`.
#[non_exhaustive]
#[derive(Debug)]
pub struct NonJson {
    pub status_code: StatusCode,
    pub method: Method,
    pub path: String,
    pub content_type: Option<String>,
    pub body: String,
    pub payload: Option<Value>,
}

impl fmt::Display for NonJson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "non-JSON response ({}, content type {}) to {} call to {}",
            self.status_code,
            self.content_type.as_deref().unwrap_or("<none>"),
            self.method,
            self.path
        )
    }
}

impl StdError for NonJson {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Cancelled {
    pub method: Method,
    pub path: String,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} call to {} was cancelled", self.method, self.path)
    }
}

impl StdError for Cancelled {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Disposed;

impl fmt::Display for Disposed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client has been disposed and its transport released")
    }
}

impl StdError for Disposed {}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_builder() || e.is_decode() {
            Kind::Internal
        } else {
            Kind::Transport
        };
        Error::with_source(kind, e)
    }
}

impl From<header::InvalidHeaderValue> for Error {
    fn from(e: header::InvalidHeaderValue) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<Status> for Error {
    fn from(err: Status) -> Self {
        Error::with_source(Kind::Status, err)
    }
}

impl From<NonJson> for Error {
    fn from(err: NonJson) -> Self {
        Error::with_source(Kind::NonJson, err)
    }
}

impl From<Cancelled> for Error {
    fn from(err: Cancelled) -> Self {
        Error::with_source(Kind::Cancelled, err)
    }
}

impl From<Disposed> for Error {
    fn from(err: Disposed) -> Self {
        Error::with_source(Kind::Disposed, err)
    }
}
