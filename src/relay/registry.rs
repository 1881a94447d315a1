#![expect(
    clippy::module_name_repetitions,
    reason = "ConnectionRegistry is the type this module exists for"
)]

use std::collections::HashSet;

use dashmap::{DashMap, Entry};

/// Concurrency-safe map from a user id to that user's live connection ids.
///
/// A user appears in the map only while at least one of their connections is open; removing
/// the last connection removes the user. Every mutation goes through the [`DashMap`] entry
/// API, so it happens under the owning shard's lock as one step and never contends with
/// users that hash to other shards.
///
/// Unknown users, unknown connections and duplicate events are no-ops: relay transports can
/// deliver lifecycle callbacks twice, so nothing here is an error.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, HashSet<String>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection_id` under `user_id`.
    ///
    /// Returns `true` if the connection was not already tracked. Blank user ids belong to
    /// anonymous connections and are ignored.
    pub fn on_connected(&self, user_id: &str, connection_id: &str) -> bool {
        let added = self.track(user_id, connection_id);

        #[cfg(feature = "tracing")]
        tracing::debug!(user_id, connection_id, added, "relay connection opened");

        added
    }

    /// Same effect as [`ConnectionRegistry::on_connected`], for sessions the transport
    /// re-established under an id it may already have reported.
    pub fn on_reconnected(&self, user_id: &str, connection_id: &str) -> bool {
        let added = self.track(user_id, connection_id);

        #[cfg(feature = "tracing")]
        tracing::debug!(user_id, connection_id, added, "relay connection re-established");

        added
    }

    /// Remove `connection_id` from `user_id`'s set, dropping the user once the set is empty.
    ///
    /// Returns `true` if the connection was tracked.
    pub fn on_disconnected(&self, user_id: &str, connection_id: &str) -> bool {
        let Entry::Occupied(mut entry) = self.connections.entry(user_id.to_owned()) else {
            return false;
        };

        let removed = entry.get_mut().remove(connection_id);
        if entry.get().is_empty() {
            entry.remove();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(user_id, connection_id, removed, "relay connection closed");

        removed
    }

    /// Snapshot of the connection ids currently tracked for `user_id`. Empty when the user
    /// has none.
    #[must_use]
    pub fn connections_for(&self, user_id: &str) -> HashSet<String> {
        self.connections
            .get(user_id)
            .map(|set| set.value().clone())
            .unwrap_or_default()
    }

    /// Whether `user_id` currently has an entry in the map.
    #[must_use]
    pub fn contains_user(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    /// Number of users with at least one live connection.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of live connections across all users.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|set| set.value().len()).sum()
    }

    /// Snapshot of every user with at least one live connection, in no particular order.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        self.connections.iter().map(|r| r.key().clone()).collect()
    }

    fn track(&self, user_id: &str, connection_id: &str) -> bool {
        if user_id.trim().is_empty() {
            return false;
        }

        self.connections
            .entry(user_id.to_owned())
            .or_default()
            .insert(connection_id.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| (*id).to_owned()).collect()
    }

    #[test]
    fn connect_then_disconnect_collapses_to_absent() {
        let registry = ConnectionRegistry::new();

        assert!(registry.on_connected("u1", "c1"));
        assert!(registry.on_connected("u1", "c2"));
        assert_eq!(registry.connections_for("u1"), set(&["c1", "c2"]));

        assert!(registry.on_disconnected("u1", "c1"));
        assert_eq!(registry.connections_for("u1"), set(&["c2"]));

        assert!(registry.on_disconnected("u1", "c2"));
        assert!(registry.connections_for("u1").is_empty());
        assert!(!registry.contains_user("u1"));
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn duplicate_connect_is_idempotent() {
        let registry = ConnectionRegistry::new();

        assert!(registry.on_connected("u1", "c1"));
        assert!(!registry.on_connected("u1", "c1"));
        assert!(!registry.on_reconnected("u1", "c1"));

        assert_eq!(registry.connections_for("u1"), set(&["c1"]));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn reconnect_registers_unknown_connection() {
        let registry = ConnectionRegistry::new();

        assert!(registry.on_reconnected("u1", "c9"));
        assert_eq!(registry.connections_for("u1"), set(&["c9"]));
    }

    #[test]
    fn disconnect_of_unknown_user_is_noop() {
        let registry = ConnectionRegistry::new();

        assert!(!registry.on_disconnected("unknown-user", "c1"));
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn disconnect_of_unknown_connection_keeps_user() {
        let registry = ConnectionRegistry::new();
        registry.on_connected("u1", "c1");

        assert!(!registry.on_disconnected("u1", "c2"));
        assert!(!registry.on_disconnected("u1", "c2"));
        assert_eq!(registry.connections_for("u1"), set(&["c1"]));
    }

    #[test]
    fn anonymous_connections_are_not_tracked() {
        let registry = ConnectionRegistry::new();

        assert!(!registry.on_connected("", "c1"));
        assert!(!registry.on_reconnected("  ", "c2"));
        assert_eq!(registry.user_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn users_are_isolated() {
        let registry = ConnectionRegistry::new();
        registry.on_connected("u1", "shared-id");
        registry.on_connected("u2", "shared-id");

        registry.on_disconnected("u1", "shared-id");

        assert!(!registry.contains_user("u1"));
        assert_eq!(registry.connections_for("u2"), set(&["shared-id"]));
        assert_eq!(registry.users(), vec!["u2".to_owned()]);
    }

    #[test]
    fn snapshot_is_detached_from_later_mutations() {
        let registry = ConnectionRegistry::new();
        registry.on_connected("u1", "c1");

        let snapshot = registry.connections_for("u1");
        registry.on_connected("u1", "c2");

        assert_eq!(snapshot, set(&["c1"]));
    }
}
