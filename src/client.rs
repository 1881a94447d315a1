//! The request/response transport core shared by every sandbox domain service.
//!
//! A [`Client`] turns a `(verb, path, payload)` tuple into either a typed value or a single
//! [`Error`] record. Every call goes through the same pipeline:
//!
//! 1. the path is checked locally and rejected if blank,
//! 2. the payload (if any) is serialized as UTF-8 JSON,
//! 3. the request is sent, racing the caller's [`CancellationToken`],
//! 4. the body is read in full, again racing the token,
//! 5. `GET`/`POST`/`PUT` reject any response not declared as `application/json`,
//! 6. non-success statuses become [`Kind::Status`](crate::error::Kind::Status) errors,
//! 7. the body is decoded into the caller's type.
//!
//! No call is ever retried.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use bon::Builder;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Method};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

#[cfg(feature = "tracing")]
use crate::body_preview;
use crate::error::{Disposed, Error};
use crate::serde_helpers::decode_body;
use crate::{JSON_MEDIA_TYPE, Result};

const DEFAULT_USER_AGENT: &str = "sandbox_client_sdk";

/// Configuration for [`Client`]
#[derive(Clone, Debug, Default, Builder)]
pub struct Config {
    /// Bearer credential sent as `Authorization: Bearer <token>` on every request.
    #[builder(into)]
    token: Option<SecretString>,
    /// Deadline applied to each request. There is none by default; cancellation is
    /// caller-driven.
    timeout: Option<Duration>,
    /// Override for the `User-Agent` header. Defaults to `sandbox_client_sdk`.
    #[builder(into)]
    user_agent: Option<String>,
    /// When set, failed calls also log their full source chain and captured backtrace.
    #[builder(default)]
    verbose_errors: bool,
}

/// An externally supplied connection pool, optionally pinned to its own base address.
///
/// When a [`Transport`] already carries a base address, [`Client::with_transport`] uses it
/// as-is and never overwrites it with the host it was given.
#[derive(Clone, Debug)]
pub struct Transport {
    client: ReqwestClient,
    base: Option<Url>,
}

impl Transport {
    #[must_use]
    pub fn new(client: ReqwestClient) -> Self {
        Self { client, base: None }
    }

    pub fn with_base(client: ReqwestClient, base: &str) -> Result<Self> {
        Ok(Self {
            client,
            base: Some(Url::parse(base)?),
        })
    }

    #[must_use]
    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }
}

/// Client for the sandbox REST API.
///
/// The client holds no per-call state, so any number of calls may be in flight at once. Share
/// it behind an [`std::sync::Arc`] and call [`Client::dispose`] once to release the underlying
/// connection pool.
///
/// # Example
///
/// ```no_run
/// use sandbox_client_sdk::types::{ApiResponse, Value};
/// use sandbox_client_sdk::{CancellationToken, Client, Config};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::builder().token("secret-token").build();
/// let client = Client::new("http://localhost:4000", config)?;
///
/// let cancel = CancellationToken::new();
/// let metrics: ApiResponse<Value> = client.get("/system/metrics", &cancel).await?;
/// println!("{}", metrics.result);
///
/// client.dispose();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    /// The [`Url`] against which every path is resolved. Always ends in `/`.
    host: Url,
    /// `Accept`, `User-Agent` and, when configured, `Authorization`.
    headers: HeaderMap,
    timeout: Option<Duration>,
    verbose_errors: bool,
    /// `None` once the client has been disposed.
    client: RwLock<Option<ReqwestClient>>,
}

impl Client {
    /// Creates a client with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the host URL is invalid or the HTTP client fails to build.
    pub fn new(host: &str, config: Config) -> Result<Client> {
        let client = ReqwestClient::builder().build()?;
        Self::from_parts(Url::parse(host)?, client, &config)
    }

    /// Creates a client on top of an existing connection pool. The transport's own base
    /// address, if set, takes precedence over `host`.
    pub fn with_transport(host: &str, transport: Transport, config: Config) -> Result<Client> {
        let host = match transport.base {
            Some(base) => base,
            None => Url::parse(host)?,
        };
        Self::from_parts(host, transport.client, &config)
    }

    fn from_parts(host: Url, client: ReqwestClient, config: &Config) -> Result<Client> {
        if host.cannot_be_a_base() {
            return Err(Error::validation(format!(
                "{host} cannot be used as a base address"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))?,
        );
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        Ok(Self {
            host: with_trailing_slash(host),
            headers,
            timeout: config.timeout,
            verbose_errors: config.verbose_errors,
            client: RwLock::new(Some(client)),
        })
    }

    /// Returns the base address every path is resolved against.
    #[must_use]
    pub fn host(&self) -> &Url {
        &self.host
    }

    /// Issues a `GET` and decodes the JSON response into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.send_json::<T, ()>(Method::GET, path, None, cancel)
            .await
    }

    /// Issues a `POST` with `payload` as the JSON body and decodes the JSON response into `T`.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &B,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.send_json(Method::POST, path, Some(payload), cancel)
            .await
    }

    /// Issues a `PUT` with `payload` as the JSON body and decodes the JSON response into `T`.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &B,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.send_json(Method::PUT, path, Some(payload), cancel)
            .await
    }

    /// Issues a `DELETE`. Any success status counts, whatever the body or its content type.
    pub async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        self.execute::<()>(Method::DELETE, path, None, false, cancel)
            .await
            .map(drop)
    }

    /// Releases the underlying connection pool. Returns `true` the first time and `false` on
    /// every later call. Calls made after disposal fail with
    /// [`Kind::Disposed`](crate::error::Kind::Disposed).
    pub fn dispose(&self) -> bool {
        let released = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();

        #[cfg(feature = "tracing")]
        if released {
            tracing::debug!(host = %self.host, "released HTTP transport");
        }

        released
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&B>,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let body = self
            .execute(method.clone(), path, payload, true, cancel)
            .await?;

        decode_body(&body).inspect_err(|e| self.log_failure(&method, path, e))
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, payload, require_json, cancel),
            fields(status_code)
        )
    )]
    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&B>,
        require_json: bool,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.exchange(&method, path, payload, require_json, cancel)
            .await
            .inspect_err(|e| self.log_failure(&method, path, e))
    }

    async fn exchange<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        path: &str,
        payload: Option<&B>,
        require_json: bool,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if path.trim().is_empty() {
            return Err(Error::validation(
                "request path must not be empty or whitespace",
            ));
        }

        let url = self.resolve(path)?;
        let client = self.transport()?;

        let mut request = client
            .request(method.clone(), url)
            .headers(self.headers.clone());
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(method = %method, path, "sending request");

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::cancelled(method.clone(), path)),
            response = request.send() => response?,
        };

        let status_code = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::cancelled(method.clone(), path)),
            body = response.text() => body?,
        };

        #[cfg(feature = "tracing")]
        {
            tracing::Span::current().record("status_code", status_code.as_u16());
            tracing::trace!(
                status = status_code.as_u16(),
                body = %body_preview(&body),
                "received response"
            );
        }

        if require_json && !is_json(content_type.as_deref()) {
            return Err(Error::non_json(
                status_code,
                method.clone(),
                path.to_owned(),
                content_type,
                body,
            ));
        }

        if !status_code.is_success() {
            return Err(Error::status(
                status_code,
                method.clone(),
                path.to_owned(),
                body,
            ));
        }

        Ok(body)
    }

    /// Joins `path` onto the base address. The result must stay under the base address, so
    /// absolute URLs and `..` segments that climb out of it are rejected.
    fn resolve(&self, path: &str) -> Result<Url> {
        if Url::parse(path).is_ok() {
            return Err(Error::validation(format!(
                "request path {path} must be relative to the base address"
            )));
        }

        let url = self.host.join(path.trim_start_matches('/'))?;
        if !url.as_str().starts_with(self.host.as_str()) {
            return Err(Error::validation(format!(
                "request path {path} resolves outside of {}",
                self.host
            )));
        }

        Ok(url)
    }

    fn transport(&self) -> Result<ReqwestClient> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Disposed.into())
    }

    #[cfg(feature = "tracing")]
    fn log_failure(&self, method: &Method, path: &str, error: &Error) {
        tracing::error!(
            method = %method,
            path,
            kind = ?error.kind(),
            status = ?error.status_code(),
            error = %error,
            "request failed"
        );

        if self.verbose_errors {
            use std::backtrace::{Backtrace, BacktraceStatus};
            use std::error::Error as StdError;

            let mut depth = 0_usize;
            let mut cause = StdError::source(error);
            while let Some(inner) = cause {
                tracing::error!(depth, cause = %inner, detail = ?inner, "caused by");
                cause = inner.source();
                depth += 1;
            }
            let backtrace = error.backtrace();
            if backtrace.status() == BacktraceStatus::Captured {
                tracing::error!(backtrace = %backtrace, "error backtrace");
            } else {
                tracing::error!(backtrace = %Backtrace::force_capture(), "error backtrace");
            }
        }
    }

    #[cfg(not(feature = "tracing"))]
    fn log_failure(&self, method: &Method, path: &str, error: &Error) {
        let _ = (self.verbose_errors, method, path, error);
    }
}

/// Exact, case-insensitive match on the media type, ignoring any parameters.
fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;

    #[test]
    fn json_media_type_matches_with_parameters() {
        assert!(is_json(Some("application/json")));
        assert!(is_json(Some("application/json; charset=utf-8")));
        assert!(is_json(Some("Application/JSON")));
    }

    #[test]
    fn json_media_type_rejects_lookalikes() {
        assert!(!is_json(None));
        assert!(!is_json(Some("text/html")));
        assert!(!is_json(Some("application/problem+json")));
        assert!(!is_json(Some("application/jsonp")));
    }

    #[test]
    fn host_gains_trailing_slash() {
        let client = Client::new("http://localhost:4000/api", Config::default()).unwrap();

        assert_eq!(client.host().as_str(), "http://localhost:4000/api/");
    }

    #[test]
    fn transport_base_is_not_overwritten() {
        let transport =
            Transport::with_base(ReqwestClient::new(), "http://sandbox.internal:9000").unwrap();
        let client =
            Client::with_transport("http://localhost:4000", transport, Config::default()).unwrap();

        assert_eq!(client.host().as_str(), "http://sandbox.internal:9000/");
    }

    #[test]
    fn transport_without_base_uses_host() {
        let transport = Transport::new(ReqwestClient::new());
        let client =
            Client::with_transport("http://localhost:4000", transport, Config::default()).unwrap();

        assert_eq!(client.host().as_str(), "http://localhost:4000/");
    }

    #[test]
    fn invalid_host_should_fail() {
        Client::new("not a url", Config::default()).unwrap_err();
        Client::new("mailto:someone@example.com", Config::default()).unwrap_err();
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let config = Config::builder().token("super-secret").build();
        let client = Client::new("http://localhost:4000", config).unwrap();

        let debug = format!("{client:?}");
        assert!(!debug.contains("super-secret"), "token leaked: {debug}");
    }

    #[test]
    fn relative_paths_resolve_under_base() {
        let client = Client::new("http://localhost:4000/api/v1", Config::default()).unwrap();

        let url = client.resolve("/fs/readFile?path=a").unwrap();
        assert_eq!(url.as_str(), "http://localhost:4000/api/v1/fs/readFile?path=a");

        let url = client.resolve("git/../task/list").unwrap();
        assert_eq!(url.as_str(), "http://localhost:4000/api/v1/task/list");
    }

    #[test]
    fn paths_escaping_base_should_fail() {
        let client = Client::new("http://localhost:4000/api/v1", Config::default()).unwrap();

        for path in [
            "http://attacker.example/steal",
            "https://localhost:4000/api/v1/task/list",
            "../../secret",
            "/../secret",
            "%2e%2e/secret",
            "\\\\attacker.example/steal",
        ] {
            let err = client.resolve(path).unwrap_err();
            assert_eq!(err.kind(), Kind::Validation, "{path} should be rejected");
        }
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn verbose_failure_logs_backtrace_without_env() {
        use std::sync::{Arc, Mutex};

        use tracing_subscriber::layer::SubscriberExt as _;

        struct CaptureWriter(Arc<Mutex<Vec<String>>>);

        impl std::io::Write for CaptureWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if let Ok(s) = std::str::from_utf8(buf) {
                    self.0.lock().expect("lock").push(s.to_owned());
                }
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let writer_target = Arc::clone(&captured);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(move || CaptureWriter(Arc::clone(&writer_target)))
            .with_ansi(false);
        let subscriber = tracing_subscriber::registry().with(layer);

        let config = Config::builder().verbose_errors(true).build();
        let client = Client::new("http://localhost:4000", config).unwrap();
        let error = Error::validation("request path must not be empty or whitespace");

        tracing::subscriber::with_default(subscriber, || {
            client.log_failure(&Method::GET, " ", &error);
        });

        let output = captured.lock().expect("lock").join("");
        assert!(output.contains("request failed"), "got: {output}");
        assert!(output.contains("caused by"), "got: {output}");
        assert!(output.contains("error backtrace"), "got: {output}");
        assert!(!output.contains("disabled backtrace"), "got: {output}");
    }

    #[test]
    fn dispose_is_idempotent() {
        let client = Client::new("http://localhost:4000", Config::default()).unwrap();

        assert!(!client.is_disposed());
        assert!(client.dispose());
        assert!(!client.dispose());
        assert!(client.is_disposed());
    }
}
