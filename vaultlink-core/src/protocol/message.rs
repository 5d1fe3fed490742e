//! Messages exchanged over the native messaging channel.

use crate::secret::SecretString;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message action. Unrecognised actions are preserved verbatim so the
/// receiver can report them back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Ping,
    Pong,
    Ready,
    Search,
    Save,
    AppLocked,
    AppUnlocked,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Ready => "READY",
            Self::Search => "SEARCH",
            Self::Save => "SAVE",
            Self::AppLocked => "APP_LOCKED",
            Self::AppUnlocked => "APP_UNLOCKED",
            Self::Other(name) => name,
        }
    }

    /// Actions pushed without a matching request (liveness and lock state).
    pub fn is_status(&self) -> bool {
        matches!(
            self,
            Self::Pong | Self::Ready | Self::AppLocked | Self::AppUnlocked
        )
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PING" => Self::Ping,
            "PONG" => Self::Pong,
            "READY" => Self::Ready,
            "SEARCH" => Self::Search,
            "SAVE" => Self::Save,
            "APP_LOCKED" => Self::AppLocked,
            "APP_UNLOCKED" => Self::AppUnlocked,
            _ => Self::Other(value),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock state reported by the desktop application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Locked,
    Unlocked,
}

/// A credential returned by a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub username: String,
    pub password: SecretString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One framed message. Requests and replies share the same shape; the
/// reply carries the request's `requestId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub request_id: String,
    pub action: Action,
    /// Unix epoch milliseconds
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Credential>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_status: Option<AppStatus>,
}

impl Message {
    /// Create a bare message stamped with the current time.
    pub fn new(request_id: impl Into<String>, action: Action) -> Self {
        Self {
            request_id: request_id.into(),
            action,
            timestamp: Utc::now().timestamp_millis(),
            domain: None,
            username: None,
            password: None,
            results: None,
            error: None,
            ok: None,
            message: None,
            app_status: None,
        }
    }

    /// Create a reply correlated with `request`.
    pub fn reply_to(request: &Message, action: Action) -> Self {
        Self::new(request.request_id.clone(), action)
    }

    /// Create an error reply for `request_id`.
    pub fn failure(request_id: impl Into<String>, action: Action, error: impl Into<String>) -> Self {
        let mut message = Self::new(request_id, action);
        message.error = Some(error.into());
        message
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.username = Some(username.into());
        self.password = Some(password);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Drop the password carried by this message, wiping its buffer.
    pub fn clear_password(&mut self) {
        if let Some(mut password) = self.password.take() {
            password.wipe();
        }
    }
}
