//! `POST /api/native-message`: SEARCH and SAVE forwarded by the native host.

use crate::error::ApiError;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};
use vaultlink_core::validation::{validate_domain, validate_password, validate_username};
use vaultlink_core::{Action, BridgeError, BridgeReply, SecretString};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
}

pub async fn native_message(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<BridgeReply>, ApiError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::bad_request(None, rejection.body_text())
        }
    })?;

    let request: NativeRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(None, format!("Invalid JSON: {}", e)))?;

    let request_id = match request.request_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(ApiError::bad_request(None, "requestId required")),
    };

    debug!(request_id = %request_id, action = ?request.action, "Native message received");

    match request.action {
        Some(Action::Search) => search(&state, request_id, request).await,
        Some(Action::Save) => save(&state, request_id, request).await,
        _ => Err(ApiError::bad_request(Some(request_id), "Unknown action")),
    }
}

async fn search(
    state: &AppState,
    request_id: String,
    request: NativeRequest,
) -> Result<Json<BridgeReply>, ApiError> {
    ensure_ready(state, &request_id)?;

    let domain = request
        .domain
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(Some(request_id.clone()), "Domain required"))?;
    let domain = validate_domain(domain).map_err(|e| invalid(&request_id, e))?;

    let completed = state
        .vault
        .search(&request_id, domain)
        .await
        .map_err(|e| ApiError::from_vault(request_id.clone(), e))?;

    info!(
        request_id = %request_id,
        results = completed.results.len(),
        "Search completed"
    );
    Ok(Json(BridgeReply::search(
        request_id,
        completed.results,
        completed.app_status,
    )))
}

async fn save(
    state: &AppState,
    request_id: String,
    request: NativeRequest,
) -> Result<Json<BridgeReply>, ApiError> {
    ensure_ready(state, &request_id)?;

    let NativeRequest {
        domain,
        username,
        password,
        ..
    } = request;
    let (Some(domain), Some(username), Some(password)) = (domain, username, password) else {
        return Err(missing_save_fields(&request_id));
    };
    if domain.trim().is_empty() || username.trim().is_empty() || password.is_empty() {
        return Err(missing_save_fields(&request_id));
    }

    let domain = validate_domain(&domain).map_err(|e| invalid(&request_id, e))?;
    validate_username(&username).map_err(|e| invalid(&request_id, e))?;
    validate_password(&password).map_err(|e| invalid(&request_id, e))?;

    let completed = state
        .vault
        .save(&request_id, domain, username, password)
        .await
        .map_err(|e| ApiError::from_vault(request_id.clone(), e))?;

    info!(request_id = %request_id, ok = completed.ok, "Save completed");
    Ok(Json(BridgeReply::save(
        request_id,
        completed.ok,
        completed.message,
    )))
}

fn ensure_ready(state: &AppState, request_id: &str) -> Result<(), ApiError> {
    if state.vault.is_ready() {
        Ok(())
    } else {
        Err(ApiError::NotReady {
            request_id: Some(request_id.to_string()),
        })
    }
}

fn missing_save_fields(request_id: &str) -> ApiError {
    ApiError::bad_request(
        Some(request_id.to_string()),
        "Domain, username and password required",
    )
}

fn invalid(request_id: &str, error: BridgeError) -> ApiError {
    let message = match error {
        BridgeError::Validation(message) => message,
        other => other.to_string(),
    };
    ApiError::bad_request(Some(request_id.to_string()), message)
}
