//! Embedded request schemas.
//!
//! Request bodies are validated against JSON Schema draft-07 documents
//! embedded at build time, before any field extraction happens. Validators
//! are compiled once at startup.

use jsonschema::Validator;
use serde_json::Value;

use crate::error::AppError;

/// The compiled request validators, one per endpoint body.
pub struct Schemas {
    pub(crate) allowed: Validator,
    pub(crate) upsert_policy: Validator,
    pub(crate) upsert_identity: Validator,
    pub(crate) upsert_group: Validator,
    pub(crate) add_group_member: Validator,
}

impl std::fmt::Debug for Schemas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schemas").finish_non_exhaustive()
    }
}

/// An embedded schema document that does not compile. Can only happen when
/// the bundled schema files are broken, so this is fatal at startup.
#[derive(Debug, thiserror::Error)]
#[error("embedded schema '{name}' is invalid: {reason}")]
pub struct SchemaError {
    name: &'static str,
    reason: String,
}

impl Schemas {
    /// Compile every embedded schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when a bundled schema document is not valid
    /// draft-07.
    pub fn load() -> Result<Self, SchemaError> {
        Ok(Self {
            allowed: compile("allowed", include_str!("../schemas/allowed.json"))?,
            upsert_policy: compile("upsert_policy", include_str!("../schemas/upsert_policy.json"))?,
            upsert_identity: compile(
                "upsert_identity",
                include_str!("../schemas/upsert_identity.json"),
            )?,
            upsert_group: compile("upsert_group", include_str!("../schemas/upsert_group.json"))?,
            add_group_member: compile(
                "add_group_member",
                include_str!("../schemas/add_group_member.json"),
            )?,
        })
    }
}

fn compile(name: &'static str, source: &str) -> Result<Validator, SchemaError> {
    let document: Value = serde_json::from_str(source).map_err(|e| SchemaError {
        name,
        reason: e.to_string(),
    })?;

    jsonschema::draft7::new(&document).map_err(|e| SchemaError {
        name,
        reason: e.to_string(),
    })
}

/// Validate a payload, collecting every violation description.
pub(crate) fn validate(validator: &Validator, payload: &Value) -> Result<(), AppError> {
    let violations: Vec<String> = validator
        .iter_errors(payload)
        .map(|error| error.to_string())
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(AppError::SchemaViolation(violations))
    }
}
