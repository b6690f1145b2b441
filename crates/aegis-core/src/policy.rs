//! Policy documents and their match semantics.
//!
//! A [`Policy`] is an ALLOW/DENY statement over two glob axes, actions and
//! resources. Matching probes the axes a request supplies; an axis the
//! request leaves out stays unresolved and yields a [`PartialPolicy`]
//! residual carrying the globs that would still have to be checked.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::compiler::PolicyCompiler;
use crate::error::{CompileError, PolicyError};

/// Whether a matching policy grants or denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyEffect {
    Allow,
    Deny,
}

/// Version of the policy document format. Only V1 exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVersion {
    V1,
}

impl PolicyVersion {
    /// The wire/storage representation of this version.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::V1 => 1,
        }
    }
}

impl TryFrom<i64> for PolicyVersion {
    type Error = PolicyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            other => Err(PolicyError::UnknownVersion(other)),
        }
    }
}

impl Serialize for PolicyVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for PolicyVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Self::try_from(value).map_err(D::Error::custom)
    }
}

/// The residual of a match along which one axis stayed unresolved.
///
/// Not independently addressable: a partial carries no id and only the glob
/// lists of the axes a request did not supply. Serialization omits absent
/// axes entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialPolicy {
    pub version: PolicyVersion,
    pub effect: PolicyEffect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}

impl PartialPolicy {
    /// Partials are never complete policy documents.
    #[must_use]
    pub fn complete(&self) -> bool {
        false
    }
}

/// A complete, identifiable policy document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    id: String,
    version: PolicyVersion,
    effect: PolicyEffect,
    actions: Vec<String>,
    resources: Vec<String>,
}

impl Policy {
    /// Construct a policy, enforcing the document invariants.
    ///
    /// An empty resources list is normalized to the catch-all `["*"]`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ActionsCannotBeEmpty`] when `actions` is
    /// empty.
    pub fn new(
        version: PolicyVersion,
        id: impl Into<String>,
        effect: PolicyEffect,
        actions: Vec<String>,
        resources: Vec<String>,
    ) -> Result<Self, PolicyError> {
        if actions.is_empty() {
            return Err(PolicyError::ActionsCannotBeEmpty);
        }

        let resources = if resources.is_empty() {
            vec!["*".to_owned()]
        } else {
            resources
        };

        Ok(Self {
            id: id.into(),
            version,
            effect,
            actions,
            resources,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn version(&self) -> PolicyVersion {
        self.version
    }

    #[must_use]
    pub fn effect(&self) -> PolicyEffect {
        self.effect
    }

    #[must_use]
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    #[must_use]
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// A policy with an id and concrete lists is always complete.
    #[must_use]
    pub fn complete(&self) -> bool {
        true
    }

    /// Match this policy against an (action, resource) probe.
    ///
    /// Either axis may be absent. An absent axis that the policy cannot
    /// resolve on its own (only `all_resources` can) stays unprobed and the
    /// result turns partial, carrying the original globs of every unprobed
    /// axis. A probed axis that fails short-circuits to a full non-match.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when one of the policy's globs does not
    /// translate to a valid pattern.
    pub fn match_request(
        &self,
        compiler: &PolicyCompiler,
        action: Option<&str>,
        resource: Option<&str>,
    ) -> Result<MatchResult, CompileError> {
        let compiled = compiler.compile(self)?;

        let mut action_hit: Option<bool> = None;
        if let Some(action) = action {
            let hit = compiled.match_action(action);
            action_hit = Some(hit);
            if !hit {
                return Ok(MatchResult::full(MatchOutcome::NotMatch));
            }
        }

        let resource_hit = compiled.match_resource(resource);
        if resource_hit == Some(false) {
            return Ok(MatchResult::full(MatchOutcome::NotMatch));
        }

        // Every probed axis is now true; a match needs at least one probe.
        let outcome = if action_hit.unwrap_or(false) || resource_hit.unwrap_or(false) {
            MatchOutcome::Match
        } else {
            MatchOutcome::NotMatch
        };

        if action_hit.is_some() && resource_hit.is_some() {
            return Ok(MatchResult::full(outcome));
        }

        Ok(MatchResult::partial(
            outcome,
            PartialPolicy {
                version: self.version,
                effect: self.effect,
                actions: action_hit.is_none().then(|| self.actions.clone()),
                resources: resource_hit.is_none().then(|| self.resources.clone()),
            },
        ))
    }
}

/// A principal's embedded policy slot.
///
/// `None` is the identity element: it never matches anything and is treated
/// as "no inline policy" by the storage layer. Serializes as JSON `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InlinePolicy {
    #[default]
    None,
    Policy(Policy),
}

impl InlinePolicy {
    /// Whether the slot holds a complete policy document.
    #[must_use]
    pub fn complete(&self) -> bool {
        matches!(self, Self::Policy(_))
    }

    /// The embedded policy, when present.
    #[must_use]
    pub fn as_policy(&self) -> Option<&Policy> {
        match self {
            Self::None => None,
            Self::Policy(policy) => Some(policy),
        }
    }

    /// Match semantics of the slot: the `None` arm is a forced full
    /// non-match regardless of input.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when the embedded policy's globs do not
    /// translate to valid patterns.
    pub fn match_request(
        &self,
        compiler: &PolicyCompiler,
        action: Option<&str>,
        resource: Option<&str>,
    ) -> Result<MatchResult, CompileError> {
        match self {
            Self::None => Ok(MatchResult::full(MatchOutcome::NotMatch)),
            Self::Policy(policy) => policy.match_request(compiler, action, resource),
        }
    }
}

impl Serialize for InlinePolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::None => serializer.serialize_none(),
            Self::Policy(policy) => policy.serialize(serializer),
        }
    }
}

/// Whether both axes of a match were resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Full,
    Partial,
}

/// Whether the probed axes matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Match,
    NotMatch,
}

/// Outcome of matching one policy against one (action, resource) probe.
#[derive(Debug, Clone)]
pub struct MatchResult {
    kind: MatchKind,
    outcome: MatchOutcome,
    partial: Option<PartialPolicy>,
}

impl MatchResult {
    fn full(outcome: MatchOutcome) -> Self {
        Self {
            kind: MatchKind::Full,
            outcome,
            partial: None,
        }
    }

    fn partial(outcome: MatchOutcome, partial: PartialPolicy) -> Self {
        Self {
            kind: MatchKind::Partial,
            outcome,
            partial: Some(partial),
        }
    }

    #[must_use]
    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    #[must_use]
    pub fn outcome(&self) -> MatchOutcome {
        self.outcome
    }

    /// The residual partial policy of a partial match.
    #[must_use]
    pub fn partial_policy(&self) -> Option<&PartialPolicy> {
        self.partial.as_ref()
    }

    /// Consume the result, taking the residual.
    #[must_use]
    pub fn into_partial_policy(self) -> Option<PartialPolicy> {
        self.partial
    }
}
