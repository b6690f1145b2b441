//! In-memory manager for testing and local development.
//!
//! Holds the same row-level layout the SQL backend persists (principal
//! rows with an optional inline-policy FK, link rows, membership id pairs)
//! and rebuilds domain objects on every load. Data is lost when the process
//! exits.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use aegis_core::{Group, Identity, InlinePolicy, Policy, PolicyCompiler, Subject};

use crate::error::StorageError;
use crate::{embedded_policy_id, Manager};

/// A principal row: the inline-policy reference plus linked policy ids.
#[derive(Debug, Default, Clone)]
struct PrincipalRow {
    policy_id: Option<String>,
    linked: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    policies: HashMap<String, Arc<Policy>>,
    identities: HashMap<String, PrincipalRow>,
    groups: HashMap<String, PrincipalRow>,
    /// (group id, identity id) pairs, in insertion order.
    memberships: Vec<(String, String)>,
}

impl MemoryState {
    fn inline_policy(&self, row: &PrincipalRow) -> InlinePolicy {
        row.policy_id
            .as_ref()
            .and_then(|id| self.policies.get(id))
            .map(|p| InlinePolicy::Policy((**p).clone()))
            .unwrap_or_default()
    }

    fn build_identity(&self, id: &str) -> Option<Identity> {
        let row = self.identities.get(id)?;
        let mut identity = Identity::new(id, self.inline_policy(row));
        for policy_id in &row.linked {
            if let Some(policy) = self.policies.get(policy_id) {
                identity.add_policy(Arc::clone(policy));
            }
        }
        Some(identity)
    }

    fn build_group(&self, id: &str) -> Option<Group> {
        let row = self.groups.get(id)?;
        let mut group = Group::new(id, self.inline_policy(row));
        for policy_id in &row.linked {
            if let Some(policy) = self.policies.get(policy_id) {
                group.add_policy(Arc::clone(policy));
            }
        }
        for (group_id, identity_id) in &self.memberships {
            if group_id == id {
                if let Some(identity) = self.build_identity(identity_id) {
                    group.add_identity(Arc::new(identity));
                }
            }
        }
        Some(group)
    }

    /// Store the synthetic inline row (or drop a stale one) and return the
    /// FK value for the principal row.
    fn store_inline(&mut self, kind: &str, principal_id: &str, inline: &InlinePolicy) -> Option<String> {
        let synthetic_id = embedded_policy_id(kind, principal_id);
        match inline.as_policy() {
            Some(policy) => {
                let stored = Policy::new(
                    policy.version(),
                    synthetic_id.clone(),
                    policy.effect(),
                    policy.actions().to_vec(),
                    policy.resources().to_vec(),
                )
                .ok()?;
                self.policies.insert(synthetic_id.clone(), Arc::new(stored));
                Some(synthetic_id)
            }
            None => {
                self.policies.remove(&synthetic_id);
                None
            }
        }
    }
}

/// A [`Manager`] holding everything in process memory.
#[derive(Debug)]
pub struct MemoryManager {
    state: Mutex<MemoryState>,
    compiler: PolicyCompiler,
}

impl MemoryManager {
    #[must_use]
    pub fn new(compiler: PolicyCompiler) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            compiler,
        }
    }
}

#[async_trait::async_trait]
impl Manager for MemoryManager {
    async fn get_identity(&self, id: &str) -> Result<Option<Arc<Identity>>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.build_identity(id).map(Arc::new))
    }

    async fn get_group(&self, id: &str) -> Result<Option<Arc<Group>>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.build_group(id).map(Arc::new))
    }

    async fn get_policy(&self, id: &str) -> Result<Option<Arc<Policy>>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.policies.get(id).cloned())
    }

    async fn groups_for(&self, identity: &Identity) -> Result<Vec<Arc<Group>>, StorageError> {
        let state = self.state.lock().await;

        let mut group_ids: Vec<&str> = Vec::new();
        for (group_id, identity_id) in &state.memberships {
            if identity_id == identity.id() && !group_ids.contains(&group_id.as_str()) {
                group_ids.push(group_id.as_str());
            }
        }

        Ok(group_ids
            .into_iter()
            .filter_map(|id| state.build_group(id).map(Arc::new))
            .collect())
    }

    async fn save_policy(&self, policy: &Policy) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state
            .policies
            .insert(policy.id().to_owned(), Arc::new(policy.clone()));
        self.compiler.clear_cache();
        Ok(())
    }

    async fn save_identity(&self, identity: &Identity) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;

        let policy_id = state.store_inline("identity", identity.id(), identity.inline_policy());
        let linked = identity
            .linked_policies()
            .iter()
            .map(|p| p.id().to_owned())
            .collect();
        state
            .identities
            .insert(identity.id().to_owned(), PrincipalRow { policy_id, linked });

        self.compiler.clear_cache();
        Ok(())
    }

    async fn save_group(&self, group: &Group) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;

        let policy_id = state.store_inline("group", group.name(), group.inline_policy());
        let linked = group
            .linked_policies()
            .iter()
            .map(|p| p.id().to_owned())
            .collect();
        state
            .groups
            .insert(group.name().to_owned(), PrincipalRow { policy_id, linked });

        // Replace the membership pairs with the group's current member set.
        state.memberships.retain(|(g, _)| g != group.name());
        for member in group.members() {
            state
                .memberships
                .push((group.name().to_owned(), member.id().to_owned()));
        }

        self.compiler.clear_cache();
        Ok(())
    }
}
