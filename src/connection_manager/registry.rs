use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use smallvec::SmallVec;
use uuid::Uuid;

use super::types::ConnectionHandle;

/// Delivery candidates resolved for one dispatch. Most dispatches hit a
/// handful of connections, so the set lives inline.
pub type ConnectionSet = SmallVec<[Arc<ConnectionHandle>; 4]>;

/// Registry state: the authoritative entry map plus both secondary indices.
///
/// Kept behind one lock so that every register/unregister updates the
/// entry map and both indices as a single atomic step. An entry present in
/// `connections` is always a member of exactly one bucket in each index.
#[derive(Default)]
struct RegistryInner {
    /// user_id -> ConnectionHandle
    connections: HashMap<String, Arc<ConnectionHandle>>,
    /// site_id -> Set<user_id>
    site_index: HashMap<String, HashSet<String>>,
    /// company_id -> Set<user_id>
    company_index: HashMap<String, HashSet<String>>,
}

impl RegistryInner {
    fn remove_entry(&mut self, user_id: &str) -> Option<Arc<ConnectionHandle>> {
        let handle = self.connections.remove(user_id)?;
        Self::drop_membership(&mut self.site_index, &handle.site_id, user_id);
        Self::drop_membership(&mut self.company_index, &handle.company_id, user_id);
        Some(handle)
    }

    fn drop_membership(
        index: &mut HashMap<String, HashSet<String>>,
        key: &str,
        user_id: &str,
    ) {
        if let Some(members) = index.get_mut(key) {
            members.remove(user_id);
            if members.is_empty() {
                index.remove(key);
            }
        }
    }
}

/// Manages all authenticated connections, indexed by user, site and company.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection, replacing any existing entry for the user.
    ///
    /// The previous entry's index memberships are scrubbed before the new
    /// ones are inserted, so a reconnect under a different site or company
    /// never leaves the user behind in a stale bucket. Returns the
    /// replaced handle, if any (last-writer-wins; the old connection is
    /// not closed here).
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Option<Arc<ConnectionHandle>> {
        let replaced = {
            let mut inner = self.write();
            let replaced = inner.remove_entry(&handle.user_id);

            inner
                .site_index
                .entry(handle.site_id.clone())
                .or_default()
                .insert(handle.user_id.clone());
            inner
                .company_index
                .entry(handle.company_id.clone())
                .or_default()
                .insert(handle.user_id.clone());
            inner
                .connections
                .insert(handle.user_id.clone(), handle.clone());

            replaced
        };

        tracing::info!(
            connection_id = %handle.id,
            user_id = %handle.user_id,
            site_id = %handle.site_id,
            company_id = %handle.company_id,
            replaced = replaced.is_some(),
            "Connection registered"
        );

        replaced
    }

    /// Unregister a user's connection. No-op for unknown users.
    pub fn unregister(&self, user_id: &str) -> Option<Arc<ConnectionHandle>> {
        let removed = self.write().remove_entry(user_id);

        if let Some(ref handle) = removed {
            tracing::info!(
                connection_id = %handle.id,
                user_id = %user_id,
                "Connection unregistered"
            );
        }

        removed
    }

    /// Unregister only if the registered entry still belongs to the given
    /// connection.
    ///
    /// Disconnect signals carry the connection id minted at handshake, so
    /// a late signal from a connection that has since been replaced cannot
    /// tear down its successor's entry. Idempotent.
    pub fn unregister_connection(
        &self,
        user_id: &str,
        connection_id: Uuid,
    ) -> Option<Arc<ConnectionHandle>> {
        let removed = {
            let mut inner = self.write();
            let owns_entry = inner
                .connections
                .get(user_id)
                .is_some_and(|handle| handle.id == connection_id);
            if owns_entry {
                inner.remove_entry(user_id)
            } else {
                None
            }
        };

        if let Some(ref handle) = removed {
            tracing::info!(
                connection_id = %handle.id,
                user_id = %user_id,
                "Connection unregistered"
            );
        }

        removed
    }

    /// Get the connection for a user
    pub fn get(&self, user_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.read().connections.get(user_id).cloned()
    }

    /// Resolve candidate user ids into handles that have the event enabled.
    ///
    /// Unknown ids are silently skipped.
    pub fn lookup_by_user_ids<I, S>(&self, ids: I, event_cmd: &str) -> ConnectionSet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inner = self.read();
        ids.into_iter()
            .filter_map(|id| inner.connections.get(id.as_ref()))
            .filter(|handle| handle.is_event_enabled(event_cmd))
            .cloned()
            .collect()
    }

    /// Current members of a site; empty set for unknown sites
    pub fn site_members(&self, site_id: &str) -> HashSet<String> {
        self.read()
            .site_index
            .get(site_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Current members of a company; empty set for unknown companies
    pub fn company_members(&self, company_id: &str) -> HashSet<String> {
        self.read()
            .company_index
            .get(company_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Get all connections
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.read().connections.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().connections.is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> RegistryStats {
        let inner = self.read();
        RegistryStats {
            connections: inner.connections.len(),
            sites: inner.site_index.len(),
            companies: inner.company_index.len(),
        }
    }

    /// Find connections that have been inactive for longer than the timeout
    pub fn find_stale_connections(&self, timeout_secs: u64) -> Vec<(String, Uuid)> {
        let now = chrono::Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.read()
            .connections
            .values()
            .filter(|handle| now.signed_duration_since(handle.last_activity()) > timeout)
            .map(|handle| (handle.user_id.clone(), handle.id))
            .collect()
    }

    /// Remove stale connections and return the count of removed connections
    pub fn cleanup_stale_connections(&self, timeout_secs: u64) -> usize {
        let stale = self.find_stale_connections(timeout_secs);
        let mut removed = 0;

        for (user_id, connection_id) in stale {
            tracing::info!(
                connection_id = %connection_id,
                user_id = %user_id,
                "Removing stale connection due to inactivity"
            );
            if self.unregister_connection(&user_id, connection_id).is_some() {
                removed += 1;
            }
        }

        removed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub connections: usize,
    pub sites: usize,
    pub companies: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(user: &str, site: &str, company: &str, events: &[&str]) -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(ConnectionHandle::new(
            user.to_string(),
            site.to_string(),
            company.to_string(),
            events.iter().map(|e| e.to_string()).collect(),
            tx,
        ))
    }

    #[test]
    fn test_register_then_unregister_clears_everything() {
        let registry = ConnectionRegistry::new();
        registry.register(handle("u1", "s1", "c1", &["ping"]));

        assert!(registry.get("u1").is_some());
        assert!(registry.site_members("s1").contains("u1"));
        assert!(registry.company_members("c1").contains("u1"));

        registry.unregister("u1");

        assert!(registry.get("u1").is_none());
        assert!(registry.site_members("s1").is_empty());
        assert!(registry.company_members("c1").is_empty());
        assert_eq!(registry.stats().sites, 0);
        assert_eq!(registry.stats().companies, 0);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry.register(handle("u1", "s1", "c1", &[]));

        assert!(registry.unregister("u1").is_some());
        assert!(registry.unregister("u1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_unknown_user_is_noop() {
        let registry = ConnectionRegistry::new();
        assert!(registry.unregister("ghost").is_none());
    }

    #[test]
    fn test_reregistration_replaces_and_cleans_old_buckets() {
        let registry = ConnectionRegistry::new();
        registry.register(handle("u1", "s1", "c1", &["ping"]));

        let replaced = registry.register(handle("u1", "s2", "c2", &["ping"]));
        assert!(replaced.is_some());

        // Exactly one entry, indexed only under the latest identity context
        assert_eq!(registry.len(), 1);
        assert!(registry.site_members("s1").is_empty());
        assert!(registry.company_members("c1").is_empty());
        assert!(registry.site_members("s2").contains("u1"));
        assert!(registry.company_members("c2").contains("u1"));
    }

    #[test]
    fn test_multiple_users_per_site() {
        let registry = ConnectionRegistry::new();
        registry.register(handle("u1", "s1", "c1", &[]));
        registry.register(handle("u2", "s1", "c2", &[]));

        let members = registry.site_members("s1");
        assert_eq!(members.len(), 2);
        assert!(members.contains("u1"));
        assert!(members.contains("u2"));

        registry.unregister("u1");
        assert_eq!(registry.site_members("s1").len(), 1);
    }

    #[test]
    fn test_lookup_filters_by_enabled_events() {
        let registry = ConnectionRegistry::new();
        registry.register(handle("u1", "s1", "c1", &["alert"]));
        registry.register(handle("u2", "s1", "c1", &["ping"]));

        let found = registry.lookup_by_user_ids(["u1", "u2", "unknown"], "alert");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, "u1");

        let none = registry.lookup_by_user_ids(["u1", "u2"], "pong");
        assert!(none.is_empty());
    }

    #[test]
    fn test_unregister_connection_requires_matching_id() {
        let registry = ConnectionRegistry::new();
        let first = handle("u1", "s1", "c1", &[]);
        let stale_id = first.id;
        registry.register(first);

        // User reconnects; a late disconnect from the first connection
        // must not remove the replacement entry.
        let second = handle("u1", "s1", "c1", &[]);
        let second_id = second.id;
        registry.register(second);

        assert!(registry.unregister_connection("u1", stale_id).is_none());
        assert!(registry.get("u1").is_some());
        assert!(registry.site_members("s1").contains("u1"));

        assert!(registry.unregister_connection("u1", second_id).is_some());
        assert!(registry.get("u1").is_none());
    }

    #[test]
    fn test_members_snapshot_unknown_keys() {
        let registry = ConnectionRegistry::new();
        assert!(registry.site_members("nope").is_empty());
        assert!(registry.company_members("nope").is_empty());
    }

    #[test]
    fn test_stats() {
        let registry = ConnectionRegistry::new();
        registry.register(handle("u1", "s1", "c1", &[]));
        registry.register(handle("u2", "s1", "c2", &[]));

        let stats = registry.stats();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.sites, 1);
        assert_eq!(stats.companies, 2);
    }
}
