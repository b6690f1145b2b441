//! Policy upsert: `POST /policies`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use tracing::info;

use aegis_core::Policy;

use crate::error::AppError;
use crate::routes::{decode_json, decode_policy, invalid_data};
use crate::schemas;
use crate::state::AppState;

/// Create or replace a policy, echoing the stored document.
pub async fn upsert_policy(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Policy>, AppError> {
    let payload = decode_json(&body)?;
    schemas::validate(&state.schemas.upsert_policy, &payload)?;

    let id = payload["id"].as_str().ok_or_else(invalid_data)?;
    let policy = decode_policy(&payload, id)?;

    state.manager.save_policy(&policy).await?;
    info!(id = %policy.id(), "policy upserted");

    Ok(Json(policy))
}
