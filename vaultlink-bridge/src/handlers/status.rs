//! Liveness endpoint.

use crate::server::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use vaultlink_core::StatusReply;

pub async fn status(State(state): State<AppState>) -> Json<StatusReply> {
    Json(StatusReply {
        status: "online".to_string(),
        app_ready: state.vault.is_ready(),
        timestamp: Utc::now().timestamp_millis(),
    })
}
