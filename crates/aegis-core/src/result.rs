//! The ternary authorization verdict and its merge algebra.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::policy::{PartialPolicy, PolicyEffect};

/// The ternary authorization verdict.
///
/// `Denied` wins over `Allowed` wins over `Abstain` when results merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AllowedOutcome {
    Denied = -1,
    Abstain = 0,
    Allowed = 1,
}

/// An authorization verdict together with the partial policies that still
/// apply to the unresolved axis.
///
/// The outcome observed through [`outcome`](AllowedResult::outcome) differs
/// from the stored one in a single case: an abstention with no residual
/// partials collapses to `Denied`.
#[derive(Debug, Clone)]
pub struct AllowedResult {
    outcome: AllowedOutcome,
    partials: Vec<PartialPolicy>,
}

impl AllowedResult {
    #[must_use]
    pub fn new(outcome: AllowedOutcome, partials: Vec<PartialPolicy>) -> Self {
        Self { outcome, partials }
    }

    /// A bare abstention, the identity element of [`merge`](Self::merge).
    #[must_use]
    pub fn abstain() -> Self {
        Self::new(AllowedOutcome::Abstain, Vec::new())
    }

    /// An unconditional denial.
    #[must_use]
    pub fn denied() -> Self {
        Self::new(AllowedOutcome::Denied, Vec::new())
    }

    /// The externally observed outcome.
    #[must_use]
    pub fn outcome(&self) -> AllowedOutcome {
        if self.outcome == AllowedOutcome::Abstain && self.partials.is_empty() {
            AllowedOutcome::Denied
        } else {
            self.outcome
        }
    }

    /// The retained partial policies, in merge order.
    #[must_use]
    pub fn partials(&self) -> &[PartialPolicy] {
        &self.partials
    }

    /// Fold another result into this one.
    ///
    /// Rules, applied in order:
    ///
    /// 1. an incoming denial is absorbing: the result becomes a bare
    ///    `Denied` and nothing mutates it further
    /// 2. an incoming allow promotes an abstention
    /// 3. incoming partials are appended
    /// 4. once the result is `Allowed`, only DENY partials are retained:
    ///    ALLOW partials are subsumed by the concrete allow, DENY partials
    ///    remain as residual conditional denials
    pub fn merge(&mut self, other: AllowedResult) {
        if other.outcome == AllowedOutcome::Denied {
            self.outcome = AllowedOutcome::Denied;
            self.partials.clear();
        }

        if self.outcome == AllowedOutcome::Denied {
            return;
        }

        if other.outcome == AllowedOutcome::Allowed {
            self.outcome = AllowedOutcome::Allowed;
        }

        self.partials.extend(other.partials);

        if self.outcome == AllowedOutcome::Allowed {
            self.partials
                .retain(|partial| partial.effect == PolicyEffect::Deny);
        }
    }
}

impl Serialize for AllowedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AllowedResult", 2)?;
        state.serialize_field("outcome", &self.outcome())?;
        state.serialize_field("partials", &self.partials)?;
        state.end()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::policy::PolicyVersion;

    fn partial(effect: PolicyEffect, resource: &str) -> PartialPolicy {
        PartialPolicy {
            version: PolicyVersion::V1,
            effect,
            actions: Some(vec!["*".to_owned()]),
            resources: Some(vec![resource.to_owned()]),
        }
    }

    #[test]
    fn can_be_created() {
        let r = AllowedResult::new(AllowedOutcome::Allowed, Vec::new());
        assert_eq!(r.outcome(), AllowedOutcome::Allowed);
    }

    #[test]
    fn abstain_with_no_partials_is_observed_denied() {
        let r = AllowedResult::abstain();
        assert_eq!(r.outcome(), AllowedOutcome::Denied);

        let with_partials = AllowedResult::new(
            AllowedOutcome::Abstain,
            vec![partial(PolicyEffect::Deny, "urn::r")],
        );
        assert_eq!(with_partials.outcome(), AllowedOutcome::Abstain);
    }

    #[test]
    fn merges_results_correctly() {
        let mut r = AllowedResult::abstain();

        r.merge(AllowedResult::new(
            AllowedOutcome::Abstain,
            vec![partial(PolicyEffect::Deny, "urn::resource1")],
        ));
        r.merge(AllowedResult::new(AllowedOutcome::Allowed, Vec::new()));
        r.merge(AllowedResult::new(
            AllowedOutcome::Abstain,
            vec![partial(PolicyEffect::Deny, "urn::resource2")],
        ));
        r.merge(AllowedResult::new(
            AllowedOutcome::Abstain,
            vec![partial(PolicyEffect::Allow, "urn::resource4")],
        ));

        assert_eq!(r.outcome(), AllowedOutcome::Allowed);
        assert_eq!(r.partials().len(), 2);
        assert!(r
            .partials()
            .iter()
            .all(|p| p.effect == PolicyEffect::Deny));
    }

    #[test]
    fn denial_is_absorbing() {
        let mut r = AllowedResult::new(
            AllowedOutcome::Allowed,
            vec![partial(PolicyEffect::Deny, "urn::r")],
        );
        r.merge(AllowedResult::denied());
        assert_eq!(r.outcome(), AllowedOutcome::Denied);
        assert!(r.partials().is_empty());

        // Nothing mutates a denial afterwards.
        r.merge(AllowedResult::new(
            AllowedOutcome::Allowed,
            vec![partial(PolicyEffect::Allow, "urn::other")],
        ));
        assert_eq!(r.outcome(), AllowedOutcome::Denied);
        assert!(r.partials().is_empty());
    }

    #[test]
    fn allow_promotes_abstain_and_drops_allow_partials() {
        let mut r = AllowedResult::new(
            AllowedOutcome::Abstain,
            vec![
                partial(PolicyEffect::Allow, "urn::a"),
                partial(PolicyEffect::Deny, "urn::d"),
            ],
        );
        r.merge(AllowedResult::new(AllowedOutcome::Allowed, Vec::new()));

        assert_eq!(r.outcome(), AllowedOutcome::Allowed);
        assert_eq!(r.partials().len(), 1);
        assert_eq!(r.partials()[0].effect, PolicyEffect::Deny);
    }

    #[test]
    fn serializes_with_the_observed_outcome() {
        let denied_by_silence = AllowedResult::abstain();
        assert_eq!(
            serde_json::to_value(&denied_by_silence).unwrap(),
            serde_json::json!({ "outcome": "Denied", "partials": [] })
        );

        let abstain = AllowedResult::new(
            AllowedOutcome::Abstain,
            vec![partial(PolicyEffect::Deny, "urn::r")],
        );
        let value = serde_json::to_value(&abstain).unwrap();
        assert_eq!(value["outcome"], "Abstain");
        assert_eq!(value["partials"].as_array().unwrap().len(), 1);
        assert_eq!(value["partials"][0]["effect"], "DENY");
    }
}
