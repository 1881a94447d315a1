//! Bookkeeping for the real-time relay layer.
//!
//! The relay exposes the sandbox operations to browser and desktop clients over persistent
//! connections and pushes notifications back to them. This module holds the one piece of
//! that layer with state of its own: the [`ConnectionRegistry`], which maps a logical user to
//! the physical connection ids currently open for that user.
//!
//! The registry is an ordinary value. Construct one, wrap it in an [`std::sync::Arc`] and hand
//! it to every endpoint that needs per-user addressing; endpoints that should not share
//! connection sets get their own instance.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use sandbox_client_sdk::relay::{ConnectionRegistry, resolve_user_id};
//!
//! let registry = Arc::new(ConnectionRegistry::new());
//!
//! // Anonymous principal, user id supplied as a query parameter
//! if let Some(user) = resolve_user_id(None, Some("u1")) {
//!     registry.on_connected(&user, "conn-a");
//! }
//!
//! assert!(registry.connections_for("u1").contains("conn-a"));
//! ```

pub mod identity;
pub mod registry;

pub use identity::resolve_user_id;
pub use registry::ConnectionRegistry;
