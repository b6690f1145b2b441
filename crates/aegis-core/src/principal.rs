//! Principals: roles, identities, and groups.
//!
//! A [`Role`] is the bare evaluation unit: an ordered, deduped list of
//! linked policies. Identities and groups are [`Subject`]s: roles with an
//! embedded [`InlinePolicy`] that is evaluated ahead of the linked list.
//! Policies are canonical shared instances (`Arc<Policy>`) owned by the
//! storage layer; principals hold references by id.

use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::compiler::PolicyCompiler;
use crate::error::CompileError;
use crate::policy::{InlinePolicy, MatchKind, MatchOutcome, Policy, PolicyEffect};
use crate::result::{AllowedOutcome, AllowedResult};

/// Evaluate an ordered list of policies against an (action, resource) probe.
///
/// Non-matches are skipped. A full DENY match short-circuits to an
/// unconditional denial; a full ALLOW match promotes the outcome; partial
/// matches accumulate their residuals. The merge algebra makes the final
/// outcome independent of policy order.
///
/// # Errors
///
/// Returns [`CompileError`] when a policy's globs do not translate to valid
/// patterns.
pub fn evaluate<'a, I>(
    policies: I,
    compiler: &PolicyCompiler,
    action: Option<&str>,
    resource: Option<&str>,
) -> Result<AllowedResult, CompileError>
where
    I: IntoIterator<Item = &'a Policy>,
{
    let mut outcome = AllowedOutcome::Abstain;
    let mut partials = Vec::new();

    for policy in policies {
        let result = policy.match_request(compiler, action, resource)?;
        if result.outcome() == MatchOutcome::NotMatch {
            continue;
        }

        match result.kind() {
            MatchKind::Full => {
                if policy.effect() == PolicyEffect::Deny {
                    return Ok(AllowedResult::denied());
                }
                outcome = AllowedOutcome::Allowed;
            }
            MatchKind::Partial => {
                if let Some(partial) = result.into_partial_policy() {
                    partials.push(partial);
                }
            }
        }
    }

    Ok(AllowedResult::new(outcome, partials))
}

/// An ordered list of linked policies, deduped by policy id.
#[derive(Debug, Clone, Default)]
pub struct Role {
    linked: Vec<Arc<Policy>>,
}

impl Role {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a role from a policy list, deduping by id (first wins).
    #[must_use]
    pub fn with_policies(policies: Vec<Arc<Policy>>) -> Self {
        let mut role = Self::new();
        for policy in policies {
            role.add_policy(policy);
        }
        role
    }

    #[must_use]
    pub fn linked_policies(&self) -> &[Arc<Policy>] {
        &self.linked
    }

    /// Link a policy. Idempotent: a policy with an already-linked id is
    /// ignored.
    pub fn add_policy(&mut self, policy: Arc<Policy>) {
        if self.linked.iter().any(|p| p.id() == policy.id()) {
            return;
        }
        self.linked.push(policy);
    }

    /// Unlink the policy with the given id. Unknown ids are ignored.
    pub fn remove_policy(&mut self, id: &str) {
        self.linked.retain(|p| p.id() != id);
    }

    /// Evaluate the linked policies only.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when a linked policy's globs do not
    /// translate to valid patterns.
    pub fn allowed(
        &self,
        compiler: &PolicyCompiler,
        action: Option<&str>,
        resource: Option<&str>,
    ) -> Result<AllowedResult, CompileError> {
        evaluate(
            self.linked.iter().map(Arc::as_ref),
            compiler,
            action,
            resource,
        )
    }
}

/// A principal that can be the target of an authorization decision.
///
/// The inline policy is evaluated ahead of the linked list; a `None` inline
/// slot contributes nothing.
pub trait Subject {
    fn inline_policy(&self) -> &InlinePolicy;

    fn linked_policies(&self) -> &[Arc<Policy>];

    /// Evaluate the inline policy followed by every linked policy.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when a policy's globs do not translate to
    /// valid patterns.
    fn allowed(
        &self,
        compiler: &PolicyCompiler,
        action: Option<&str>,
        resource: Option<&str>,
    ) -> Result<AllowedResult, CompileError> {
        evaluate(
            self.inline_policy()
                .as_policy()
                .into_iter()
                .chain(self.linked_policies().iter().map(Arc::as_ref)),
            compiler,
            action,
            resource,
        )
    }
}

/// An individual principal.
#[derive(Debug, Clone)]
pub struct Identity {
    id: String,
    inline_policy: InlinePolicy,
    role: Role,
}

impl Identity {
    #[must_use]
    pub fn new(id: impl Into<String>, inline_policy: InlinePolicy) -> Self {
        Self {
            id: id.into(),
            inline_policy,
            role: Role::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_policy(&mut self, policy: Arc<Policy>) {
        self.role.add_policy(policy);
    }

    pub fn remove_policy(&mut self, id: &str) {
        self.role.remove_policy(id);
    }
}

impl Subject for Identity {
    fn inline_policy(&self) -> &InlinePolicy {
        &self.inline_policy
    }

    fn linked_policies(&self) -> &[Arc<Policy>] {
        self.role.linked_policies()
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let linked: Vec<&str> = self.linked_policies().iter().map(|p| p.id()).collect();
        let mut state = serializer.serialize_struct("Identity", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("inline_policy", &self.inline_policy)?;
        state.serialize_field("linked_policies", &linked)?;
        state.end()
    }
}

/// A named collection of identities with its own policies.
///
/// Membership is the only many-to-many relation among principals; the
/// storage layer persists member ids and rebuilds the materialized list on
/// load.
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    inline_policy: InlinePolicy,
    role: Role,
    members: Vec<Arc<Identity>>,
}

impl Group {
    #[must_use]
    pub fn new(name: impl Into<String>, inline_policy: InlinePolicy) -> Self {
        Self {
            name: name.into(),
            inline_policy,
            role: Role::new(),
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn members(&self) -> &[Arc<Identity>] {
        &self.members
    }

    pub fn add_policy(&mut self, policy: Arc<Policy>) {
        self.role.add_policy(policy);
    }

    pub fn remove_policy(&mut self, id: &str) {
        self.role.remove_policy(id);
    }

    /// Add a member. Idempotent by identity id.
    pub fn add_identity(&mut self, identity: Arc<Identity>) {
        if self.members.iter().any(|i| i.id() == identity.id()) {
            return;
        }
        self.members.push(identity);
    }

    /// Remove the member with the given id. Unknown ids are ignored.
    pub fn remove_identity(&mut self, id: &str) {
        self.members.retain(|i| i.id() != id);
    }
}

impl Subject for Group {
    fn inline_policy(&self) -> &InlinePolicy {
        &self.inline_policy
    }

    fn linked_policies(&self) -> &[Arc<Policy>] {
        self.role.linked_policies()
    }
}

impl Serialize for Group {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let members: Vec<&str> = self.members.iter().map(|i| i.id()).collect();
        let linked: Vec<&str> = self.linked_policies().iter().map(|p| p.id()).collect();
        let mut state = serializer.serialize_struct("Group", 4)?;
        state.serialize_field("id", &self.name)?;
        state.serialize_field("members", &members)?;
        state.serialize_field("inline_policy", &self.inline_policy)?;
        state.serialize_field("linked_policies", &linked)?;
        state.end()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::policy::PolicyVersion;

    fn compiler() -> PolicyCompiler {
        PolicyCompiler::new()
    }

    fn policy(
        id: &str,
        effect: PolicyEffect,
        actions: &[&str],
        resources: &[&str],
    ) -> Arc<Policy> {
        Arc::new(
            Policy::new(
                PolicyVersion::V1,
                id,
                effect,
                actions.iter().map(ToString::to_string).collect(),
                resources.iter().map(ToString::to_string).collect(),
            )
            .unwrap(),
        )
    }

    fn deny_test_role() -> Role {
        Role::with_policies(vec![
            policy("RoleTestPolicy", PolicyEffect::Allow, &["TestAction"], &[]),
            policy(
                "RoleTestPolicy2",
                PolicyEffect::Deny,
                &["TestAction"],
                &["urn:resource:test-class-deny:*"],
            ),
        ])
    }

    #[test]
    fn role_starts_empty() {
        let role = Role::new();
        assert!(role.linked_policies().is_empty());
    }

    #[test]
    fn policies_can_be_added_idempotently() {
        let mut role = Role::new();
        role.add_policy(policy("RoleTestPolicy", PolicyEffect::Allow, &["*"], &[]));

        let rtp2 = policy("RoleTestPolicy2", PolicyEffect::Allow, &["*"], &[]);
        role.add_policy(Arc::clone(&rtp2));
        assert_eq!(role.linked_policies().len(), 2);

        role.add_policy(rtp2);
        assert_eq!(role.linked_policies().len(), 2);

        let with_policies = Role::with_policies(vec![policy(
            "RoleTestPolicy3",
            PolicyEffect::Allow,
            &["*"],
            &[],
        )]);
        assert_eq!(with_policies.linked_policies().len(), 1);
    }

    #[test]
    fn policies_can_be_removed() {
        let mut role = Role::new();
        role.add_policy(policy("RoleTestPolicy", PolicyEffect::Allow, &["*"], &[]));
        let rtp2 = policy("RoleTestPolicy2", PolicyEffect::Allow, &["*"], &[]);
        role.add_policy(Arc::clone(&rtp2));
        assert_eq!(role.linked_policies().len(), 2);

        role.remove_policy(rtp2.id());
        assert_eq!(role.linked_policies().len(), 1);

        role.remove_policy("RoleTestPolicy");
        assert!(role.linked_policies().is_empty());
    }

    #[test]
    fn role_allowed_should_work() {
        let c = compiler();
        let role = deny_test_role();

        let result = role
            .allowed(&c, Some("TestAction"), Some("urn:resource:test-class-allow:test-id"))
            .unwrap();
        assert_eq!(result.outcome(), AllowedOutcome::Allowed);
        assert!(result.partials().is_empty());

        let result = role
            .allowed(&c, Some("TestAction"), Some("urn:resource:test-class-deny:test-id"))
            .unwrap();
        assert_eq!(result.outcome(), AllowedOutcome::Denied);
        assert!(result.partials().is_empty());

        // Nothing matched, nothing residual: observed as a denial.
        let result = role
            .allowed(&c, Some("FooAction"), Some("urn:resource:test-class-deny:test-id"))
            .unwrap();
        assert_eq!(result.outcome(), AllowedOutcome::Denied);
        assert!(result.partials().is_empty());

        let result = role.allowed(&c, Some("TestAction"), None).unwrap();
        assert_eq!(result.outcome(), AllowedOutcome::Allowed);
        assert_eq!(result.partials().len(), 1);
    }

    #[test]
    fn identity_checks_its_inline_policy() {
        let c = compiler();
        let identity = Identity::new(
            "IdentityTestInline",
            InlinePolicy::Policy((*policy(
                "TestInlinePolicyOnIdentity",
                PolicyEffect::Allow,
                &["*"],
                &["urn:test-resource:id"],
            )).clone()),
        );

        let result = identity
            .allowed(&c, Some("test:identity"), Some("urn:test-resource:id"))
            .unwrap();
        assert_eq!(result.outcome(), AllowedOutcome::Allowed);
        assert!(result.partials().is_empty());

        let result = identity.allowed(&c, Some("test:identity"), None).unwrap();
        assert_eq!(result.outcome(), AllowedOutcome::Abstain);
        assert_eq!(result.partials().len(), 1);
    }

    #[test]
    fn identity_checks_inline_and_linked_policies() {
        let c = compiler();
        let mut identity = Identity::new(
            "IdentityTestInlineAndLinked",
            InlinePolicy::Policy((*policy(
                "TestInlinePolicyOnIdentity",
                PolicyEffect::Allow,
                &["test:not-identity"],
                &["urn:test-resource:id"],
            )).clone()),
        );

        identity.add_policy(policy(
            "TestLinkedPolicyOnIdentity",
            PolicyEffect::Allow,
            &["test:identity"],
            &["*"],
        ));

        let result = identity
            .allowed(&c, Some("test:identity"), Some("urn:test:aegis:identity"))
            .unwrap();
        assert_eq!(result.outcome(), AllowedOutcome::Allowed);
    }

    #[test]
    fn group_membership_is_idempotent() {
        let mut group = Group::new("Group", InlinePolicy::None);
        assert!(group.members().is_empty());

        let identity = Arc::new(Identity::new("TestIdentity", InlinePolicy::None));
        group.add_identity(Arc::clone(&identity));
        group.add_identity(identity);
        assert_eq!(group.members().len(), 1);
    }

    #[test]
    fn group_members_can_be_removed() {
        let mut group = Group::new("Group", InlinePolicy::None);
        let i = Arc::new(Identity::new("TestIdentity", InlinePolicy::None));
        let i2 = Arc::new(Identity::new("TestIdentity2", InlinePolicy::None));

        group.add_identity(Arc::clone(&i));
        group.add_identity(Arc::clone(&i2));
        assert_eq!(group.members().len(), 2);

        group.remove_identity(i.id());
        assert_eq!(group.members().len(), 1);

        group.remove_identity(i.id());
        assert_eq!(group.members().len(), 1);

        group.remove_identity(i2.id());
        assert!(group.members().is_empty());
    }

    #[test]
    fn identity_serializes_linked_policies_as_ids() {
        let mut identity = Identity::new("urn:identity:test", InlinePolicy::None);
        identity.add_policy(policy("P1", PolicyEffect::Allow, &["a"], &[]));

        assert_eq!(
            serde_json::to_value(&identity).unwrap(),
            serde_json::json!({
                "id": "urn:identity:test",
                "inline_policy": null,
                "linked_policies": ["P1"],
            })
        );
    }

    #[test]
    fn group_serializes_members_as_ids() {
        let mut group = Group::new("TestGroup", InlinePolicy::None);
        group.add_identity(Arc::new(Identity::new("i1", InlinePolicy::None)));
        group.add_policy(policy("P1", PolicyEffect::Allow, &["a"], &[]));

        assert_eq!(
            serde_json::to_value(&group).unwrap(),
            serde_json::json!({
                "id": "TestGroup",
                "members": ["i1"],
                "inline_policy": null,
                "linked_policies": ["P1"],
            })
        );
    }
}
