//! Identity upsert: `POST /identities`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use tracing::info;

use aegis_core::Identity;

use crate::error::AppError;
use crate::routes::{decode_inline_policy, decode_json, invalid_data, string_array};
use crate::schemas;
use crate::state::AppState;

/// Create or replace an identity, echoing the stored document.
///
/// Linked policy ids that do not resolve are skipped, matching the
/// skip-unknown behavior of group member resolution.
pub async fn upsert_identity(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Identity>, AppError> {
    let payload = decode_json(&body)?;
    schemas::validate(&state.schemas.upsert_identity, &payload)?;

    let id = payload["id"].as_str().ok_or_else(invalid_data)?;
    let inline = decode_inline_policy(&payload["inline_policy"])?;

    let mut identity = Identity::new(id, inline);
    for policy_id in string_array(&payload["linked_policies"]).unwrap_or_default() {
        if let Some(policy) = state.manager.get_policy(&policy_id).await? {
            identity.add_policy(policy);
        }
    }

    state.manager.save_identity(&identity).await?;
    info!(id = %identity.id(), "identity upserted");

    Ok(Json(identity))
}
