//! The authorization decision endpoint: `POST /allowed`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use aegis_core::{AllowedOutcome, AllowedResult, Subject};

use crate::error::AppError;
use crate::routes::{decode_json, invalid_data};
use crate::schemas;
use crate::state::AppState;

/// Answer "is `subject` permitted to perform `action` on `resource`?".
///
/// A missing subject is a denial, not an error. The response status is 403
/// when the observed outcome is `Denied`, 200 otherwise; the body carries
/// the outcome and any retained partial policies either way.
pub async fn allowed(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload = decode_json(&body)?;
    schemas::validate(&state.schemas.allowed, &payload)?;

    let subject = payload["subject"].as_str().ok_or_else(invalid_data)?;
    let action = payload["action"].as_str().ok_or_else(invalid_data)?;
    let resource = payload.get("resource").and_then(serde_json::Value::as_str);

    let mut result = AllowedResult::abstain();
    match state.manager.get_identity(subject).await? {
        None => result.merge(AllowedResult::denied()),
        Some(identity) => {
            result.merge(identity.allowed(&state.compiler, Some(action), resource)?);

            // Identity first, then its groups: the algebra is
            // DENY-absorbing, so group order cannot change the outcome.
            for group in state.manager.groups_for(&identity).await? {
                result.merge(group.allowed(&state.compiler, Some(action), resource)?);
            }
        }
    }

    let outcome = result.outcome();
    debug!(subject, action, resource, ?outcome, "decision computed");

    let status = if outcome == AllowedOutcome::Denied {
        StatusCode::FORBIDDEN
    } else {
        StatusCode::OK
    };

    Ok((status, Json(result)).into_response())
}
