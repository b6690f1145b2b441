//! HTTP route handlers.
//!
//! Routes are organized by resource:
//! - `status`: liveness probe
//! - `allowed`: the authorization decision endpoint
//! - `policies`: policy upsert
//! - `identities`: identity upsert
//! - `groups`: group upsert and membership management

pub mod allowed;
pub mod groups;
pub mod identities;
pub mod policies;
pub mod status;

use std::sync::Arc;

use axum::body::Bytes;
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::Value;

use aegis_core::{InlinePolicy, Policy, PolicyEffect, PolicyVersion};

use crate::error::AppError;
use crate::state::AppState;

/// Build the application router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/_status", get(status::status))
        .route("/allowed", post(allowed::allowed))
        .route("/policies", post(policies::upsert_policy))
        .route("/identities", post(identities::upsert_identity))
        .route("/groups", post(groups::upsert_group))
        .route("/group/{id}/members", post(groups::add_member))
        .route(
            "/group/{id}/member/{identity_id}",
            delete(groups::remove_member),
        )
}

// ── Shared helpers ───────────────────────────────────────────────────

/// Parse the raw body as JSON.
pub(crate) fn decode_json(body: &Bytes) -> Result<Value, AppError> {
    serde_json::from_slice(body).map_err(|_| AppError::BadRequest("Invalid body".to_owned()))
}

/// The generic "schema passed but the data still doesn't fit" rejection.
pub(crate) fn invalid_data() -> AppError {
    AppError::BadRequest("Invalid data".to_owned())
}

/// Extract an array of strings from a JSON value.
pub(crate) fn string_array(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(ToOwned::to_owned)
            .collect()
    })
}

/// Decode a policy body (`effect`, `actions`, `resources`) under the given
/// id. Inline policies are decoded with an empty id.
pub(crate) fn decode_policy(value: &Value, id: &str) -> Result<Policy, AppError> {
    let effect = match value["effect"].as_str() {
        Some("ALLOW") => PolicyEffect::Allow,
        Some("DENY") => PolicyEffect::Deny,
        _ => return Err(invalid_data()),
    };

    let actions = string_array(&value["actions"]).ok_or_else(invalid_data)?;
    let resources = string_array(&value["resources"]).ok_or_else(invalid_data)?;

    Ok(Policy::new(PolicyVersion::V1, id, effect, actions, resources)?)
}

/// Decode an `inline_policy` field: `null` means no inline policy.
pub(crate) fn decode_inline_policy(value: &Value) -> Result<InlinePolicy, AppError> {
    if value.is_null() {
        return Ok(InlinePolicy::None);
    }

    Ok(InlinePolicy::Policy(decode_policy(value, "")?))
}
