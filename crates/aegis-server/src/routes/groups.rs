//! Group upsert and membership management.
//!
//! - `POST /groups` — create or replace a group
//! - `POST /group/{id}/members` — add a member
//! - `DELETE /group/{id}/member/{identity_id}` — remove a member

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use tracing::info;

use aegis_core::Group;

use crate::error::AppError;
use crate::routes::{decode_inline_policy, decode_json, invalid_data, string_array};
use crate::schemas;
use crate::state::AppState;

/// Create or replace a group, echoing the stored document.
///
/// Linked policy ids and member ids that do not resolve are skipped. A save
/// replaces the persisted member set with exactly the request's `members`
/// list (absent means empty).
pub async fn upsert_group(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Group>, AppError> {
    let payload = decode_json(&body)?;
    schemas::validate(&state.schemas.upsert_group, &payload)?;

    let name = payload["id"].as_str().ok_or_else(invalid_data)?;
    let inline = decode_inline_policy(&payload["inline_policy"])?;

    let mut group = Group::new(name, inline);
    for policy_id in string_array(&payload["linked_policies"]).unwrap_or_default() {
        if let Some(policy) = state.manager.get_policy(&policy_id).await? {
            group.add_policy(policy);
        }
    }
    for identity_id in string_array(&payload["members"]).unwrap_or_default() {
        if let Some(identity) = state.manager.get_identity(&identity_id).await? {
            group.add_identity(identity);
        }
    }

    state.manager.save_group(&group).await?;
    info!(id = %group.name(), "group upserted");

    Ok(Json(group))
}

/// Add an existing identity to an existing group, echoing the request body.
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload = decode_json(&body)?;
    schemas::validate(&state.schemas.add_group_member, &payload)?;

    let group = state.manager.get_group(&id).await?.ok_or(AppError::NotFound)?;

    let identity_id = payload["id"].as_str().ok_or_else(invalid_data)?;
    let identity = state
        .manager
        .get_identity(identity_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut group = (*group).clone();
    group.add_identity(identity);
    state.manager.save_group(&group).await?;
    info!(group = %group.name(), member = identity_id, "group member added");

    Ok(Json(payload))
}

/// Remove an identity from a group.
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Path((id, identity_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let group = state.manager.get_group(&id).await?.ok_or(AppError::NotFound)?;
    let identity = state
        .manager
        .get_identity(&identity_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut group = (*group).clone();
    group.remove_identity(identity.id());
    state.manager.save_group(&group).await?;
    info!(group = %group.name(), member = %identity_id, "group member removed");

    Ok(StatusCode::OK)
}
