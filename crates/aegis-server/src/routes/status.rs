//! Liveness probe: `GET /_status`.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse { status: "OK" })
}
