//! Sandbox API walkthrough: reads system metrics, writes a file, and tracks relay connections.
//!
//! Run against a local sandbox with tracing enabled:
//! ```sh
//! SANDBOX_URL=http://localhost:4000 SANDBOX_TOKEN=... \
//!   RUST_LOG=info,sandbox_client_sdk=trace,hyper_util=off,hyper=off,reqwest=off \
//!   cargo run --example sandbox
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=sandbox.log RUST_LOG=info cargo run --example sandbox
//! ```

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use sandbox_client_sdk::error::Kind;
use sandbox_client_sdk::relay::{ConnectionRegistry, resolve_user_id};
use sandbox_client_sdk::types::{ApiResponse, Value};
use sandbox_client_sdk::{CancellationToken, Client, Config};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }

    let host = std::env::var("SANDBOX_URL").unwrap_or_else(|_| "http://localhost:4000".to_owned());
    let config = Config::builder()
        .maybe_token(std::env::var("SANDBOX_TOKEN").ok())
        .timeout(Duration::from_secs(30))
        .verbose_errors(std::env::var("SANDBOX_VERBOSE").is_ok())
        .build();
    let client = Arc::new(Client::new(&host, config)?);
    let cancel = CancellationToken::new();

    match client
        .get::<ApiResponse<Value>>("/system/metrics", &cancel)
        .await
    {
        Ok(metrics) => info!(endpoint = "system/metrics", result = %metrics.result),
        Err(e) if e.kind() == Kind::NonJson => {
            warn!(endpoint = "system/metrics", status = ?e.status_code(), "sandbox answered with a non-JSON page");
        }
        Err(e) => warn!(endpoint = "system/metrics", error = %e),
    }

    let payload = json!({"path": "/tmp/hello.txt", "content": "hello from rust"});
    match client
        .post::<ApiResponse<Value>, _>("/fs/writeFile", &payload, &cancel)
        .await
    {
        Ok(response) => info!(endpoint = "fs/writeFile", status = %response.status),
        Err(e) => match e.api_error() {
            Some(api) => warn!(endpoint = "fs/writeFile", code = %api.error.code, message = %api.error.message),
            None => warn!(endpoint = "fs/writeFile", error = %e),
        },
    }

    if let Err(e) = client.delete("/shell/demo", &cancel).await {
        warn!(endpoint = "shell/demo", error = %e);
    }

    let registry = Arc::new(ConnectionRegistry::new());
    for (principal, query, connection_id) in [
        (Some("alice"), None, "c1"),
        (None, Some("alice"), "c2"),
        (None, None, "c3"),
    ] {
        if let Some(user_id) = resolve_user_id(principal, query) {
            registry.on_connected(&user_id, connection_id);
        }
    }
    info!(
        users = registry.user_count(),
        alice = ?registry.connections_for("alice"),
        "relay connections"
    );

    client.dispose();

    Ok(())
}
