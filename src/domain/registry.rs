//! Concurrent connection and group-membership registry.
//!
//! [`ConnectionRegistry`] tracks two independent mappings:
//!
//! - **identities**: `user_id → ConnectionId`, one live connection per user
//!   (last write wins on reconnect);
//! - **groups**: `group_key → {member_id}`, where a group key is a
//!   namespaced string such as `"topic:42"` or `"subscribers:42"`.
//!
//! Both maps are [`DashMap`]s, so each mutation locks a single shard and
//! readers never wait on more than one in-flight write. No operation here
//! can fail; unknown keys are treated as empty.
//!
//! A group whose member set becomes empty is removed from the map, so
//! `stats().active_group_count` only ever counts groups with members.

use std::collections::HashSet;

use dashmap::DashMap;
use serde::Serialize;
use utoipa::ToSchema;

use super::ConnectionId;

/// Point-in-time aggregate counters over the registry.
///
/// Computed on demand by [`ConnectionRegistry::stats`]. The three fields are
/// read one after another without a global lock, so under concurrent churn
/// they may describe slightly different instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Number of user identities with a live connection.
    pub connected_count: usize,
    /// Number of groups with at least one member.
    pub active_group_count: usize,
    /// Sum of member counts over all groups.
    pub total_memberships: usize,
}

/// In-memory registry of identities and group memberships.
///
/// Constructed once per push channel and shared via `Arc`; every method
/// takes `&self` and synchronizes internally.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    identities: DashMap<String, ConnectionId>,
    groups: DashMap<String, HashSet<String>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `user_id` with `connection_id`, replacing any previous
    /// connection for that user.
    pub fn connect(&self, user_id: &str, connection_id: ConnectionId) {
        if let Some(previous) = self.identities.insert(user_id.to_string(), connection_id)
            && previous != connection_id
        {
            tracing::debug!(user_id, %previous, current = %connection_id, "identity moved to new connection");
        }
    }

    /// Removes the identity mapping for `user_id`, if any.
    pub fn disconnect(&self, user_id: &str) {
        if let Some((_, connection_id)) = self.identities.remove(user_id) {
            tracing::debug!(user_id, %connection_id, "identity removed");
        }
    }

    /// Removes the identity mapping for `user_id` only if it still points at
    /// `connection_id`.
    ///
    /// A user who reconnected before the old session finished closing keeps
    /// the newer mapping.
    pub fn disconnect_connection(&self, user_id: &str, connection_id: ConnectionId) {
        let removed = self
            .identities
            .remove_if(user_id, |_, current| *current == connection_id);
        if removed.is_some() {
            tracing::debug!(user_id, %connection_id, "identity removed");
        }
    }

    /// Returns the live connection for `user_id`.
    #[must_use]
    pub fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.identities.get(user_id).map(|entry| *entry.value())
    }

    /// Adds `member_id` to `group_key`, creating the group if needed.
    ///
    /// Returns `true` if the member was not already present.
    pub fn join_group(&self, group_key: &str, member_id: &str) -> bool {
        self.groups
            .entry(group_key.to_string())
            .or_default()
            .insert(member_id.to_string())
    }

    /// Removes `member_id` from `group_key`, dropping the group once empty.
    ///
    /// Returns `true` if the member was present. Leaving a group that was
    /// never joined is a no-op.
    pub fn leave_group(&self, group_key: &str, member_id: &str) -> bool {
        let removed = match self.groups.get_mut(group_key) {
            Some(mut members) => members.remove(member_id),
            None => return false,
        };
        // Re-checked under the shard lock: a concurrent join keeps the group.
        self.groups
            .remove_if(group_key, |_, members| members.is_empty());
        removed
    }

    /// Removes `member_id` from every group it belongs to.
    ///
    /// Returns the keys of the groups the member was removed from.
    pub fn leave_all(&self, member_id: &str) -> Vec<String> {
        let mut left = Vec::new();
        self.groups.retain(|key, members| {
            if members.remove(member_id) {
                left.push(key.clone());
            }
            !members.is_empty()
        });
        left
    }

    /// Returns a snapshot of the members of `group_key`.
    ///
    /// Unknown groups yield an empty set.
    #[must_use]
    pub fn members_of(&self, group_key: &str) -> HashSet<String> {
        self.groups
            .get(group_key)
            .map(|members| members.value().clone())
            .unwrap_or_default()
    }

    /// Returns the number of members of `group_key` (0 for unknown groups).
    #[must_use]
    pub fn member_count(&self, group_key: &str) -> usize {
        self.groups
            .get(group_key)
            .map_or(0, |members| members.value().len())
    }

    /// Returns `true` if `member_id` currently belongs to `group_key`.
    #[must_use]
    pub fn is_member(&self, group_key: &str, member_id: &str) -> bool {
        self.groups
            .get(group_key)
            .is_some_and(|members| members.value().contains(member_id))
    }

    /// Computes aggregate counters from the current contents.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let total_memberships = self
            .groups
            .iter()
            .map(|entry| entry.value().len())
            .sum();
        RegistryStats {
            connected_count: self.identities.len(),
            active_group_count: self.groups.len(),
            total_memberships,
        }
    }
}
