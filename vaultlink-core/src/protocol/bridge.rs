//! JSON bodies exchanged between the native host and the bridge server.

use super::message::{AppStatus, Credential};
use serde::{Deserialize, Serialize};

/// Body of every `/api/native-message` response, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Credential>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_status: Option<AppStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds until a rate-limited client may retry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u64>,
}

impl BridgeReply {
    pub fn search(request_id: String, results: Vec<Credential>, app_status: AppStatus) -> Self {
        Self {
            request_id: Some(request_id),
            results: Some(results),
            app_status: Some(app_status),
            ..Self::default()
        }
    }

    pub fn save(request_id: String, ok: bool, message: String) -> Self {
        Self {
            request_id: Some(request_id),
            ok: Some(ok),
            message: Some(message),
            ..Self::default()
        }
    }

    pub fn error(request_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            request_id,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Body of `GET /api/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub status: String,
    pub app_ready: bool,
    pub timestamp: i64,
}
