//! Requests coming from the extension's own pages (popup, content scripts).

use super::{Messenger, RequestData};
use crate::protocol::Action;
use crate::secret::SecretString;
use crate::validation::{validate_domain, validate_password, validate_username};
use crate::{BoxFuture, BridgeError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// A UI-facing request, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UiRequest {
    SearchPassword {
        #[serde(default)]
        domain: String,
    },
    SavePassword {
        #[serde(default)]
        domain: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: SecretString,
    },
    CheckStatus,
    FillCredentials {
        #[serde(default, rename = "tabId")]
        tab_id: Option<i64>,
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: SecretString,
    },
    CredentialCaptured {
        #[serde(default)]
        domain: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: SecretString,
    },
}

/// Who sent a [`UiRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSender {
    pub id: String,
    #[serde(default)]
    pub tab_id: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UiResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// A credential captured from a submitted login form, held until the user
/// decides whether to save it.
#[derive(Debug, Clone)]
pub struct CapturedCredential {
    pub domain: String,
    pub username: String,
    pub password: SecretString,
    pub captured_at: i64,
}

/// Fills credentials into a page.
pub trait PageRelay: Send + Sync + 'static {
    fn fill<'a>(
        &'a self,
        tab_id: i64,
        username: &'a str,
        password: &'a SecretString,
    ) -> BoxFuture<'a, Result<()>>;
}

impl Messenger {
    /// Serve one UI request. Requests from any sender other than the
    /// configured extension are refused before anything is dispatched.
    pub async fn handle_ui_request(&self, sender: &UiSender, request: UiRequest) -> UiResponse {
        if sender.id != self.inner.config.extension_id {
            warn!(sender = %sender.id, "Rejecting request from unrecognized sender");
            return UiResponse::failure("Unauthorized sender");
        }

        match self.dispatch_ui(sender, request).await {
            Ok(data) => UiResponse::ok(data),
            Err(e) => {
                debug!("UI request failed: {}", e);
                UiResponse::failure(e.to_string())
            }
        }
    }

    async fn dispatch_ui(&self, sender: &UiSender, request: UiRequest) -> Result<Value> {
        match request {
            UiRequest::SearchPassword { domain } => {
                let domain = validate_domain(&domain)?;
                let reply = self
                    .send_message(Action::Search, RequestData::search(domain))
                    .await?;
                Ok(json!({
                    "results": reply.results.unwrap_or_default(),
                    "appStatus": reply.app_status,
                }))
            }
            UiRequest::SavePassword {
                domain,
                username,
                password,
            } => {
                let domain = validate_domain(&domain)?;
                validate_username(&username)?;
                validate_password(&password)?;

                let reply = self
                    .send_message(Action::Save, RequestData::save(domain, username, password))
                    .await?;
                if reply.ok == Some(false) {
                    return Err(BridgeError::Remote(
                        reply.message.unwrap_or_else(|| "Save failed".to_string()),
                    ));
                }
                Ok(json!({ "ok": true, "message": reply.message }))
            }
            UiRequest::CheckStatus => {
                let outcome = self.send_message(Action::Ping, RequestData::default()).await;
                let mut status = json!({
                    "connected": outcome.is_ok(),
                    "state": self.state(),
                    "badge": self.badge(),
                });
                if let Err(e) = outcome {
                    status["error"] = Value::String(e.to_string());
                }
                Ok(status)
            }
            UiRequest::FillCredentials {
                tab_id,
                username,
                password,
            } => {
                let tab_id = tab_id
                    .or(sender.tab_id)
                    .ok_or_else(|| BridgeError::Validation("Tab id required".to_string()))?;
                validate_username(&username)?;
                validate_password(&password)?;

                let relay = self.inner.page_relay().ok_or_else(|| {
                    BridgeError::Connection("No page relay available".to_string())
                })?;
                relay.fill(tab_id, &username, &password).await?;
                Ok(json!({ "filled": true, "tabId": tab_id }))
            }
            UiRequest::CredentialCaptured {
                domain,
                username,
                password,
            } => {
                let domain = validate_domain(&domain)?;
                validate_username(&username)?;
                validate_password(&password)?;

                debug!(domain = %domain, "Captured credential pending save");
                *self.inner.captured() = Some(CapturedCredential {
                    domain: domain.clone(),
                    username,
                    password,
                    captured_at: Utc::now().timestamp_millis(),
                });
                Ok(json!({ "captured": domain }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::{Badge, Connector, MessengerConfig, NativePort};
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Connector that never reaches a host.
    struct NoHost {
        attempts: Arc<AtomicU32>,
    }

    impl Connector for NoHost {
        fn open(&self) -> BoxFuture<'_, io::Result<NativePort>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(io::Error::new(io::ErrorKind::NotFound, "no host")) })
        }
    }

    #[derive(Default)]
    struct RecordingRelay {
        fills: Mutex<Vec<(i64, String, String)>>,
    }

    impl PageRelay for RecordingRelay {
        fn fill<'a>(
            &'a self,
            tab_id: i64,
            username: &'a str,
            password: &'a SecretString,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.fills.lock().unwrap().push((
                    tab_id,
                    username.to_string(),
                    password.expose().to_string(),
                ));
                Ok(())
            })
        }
    }

    fn messenger() -> (Messenger, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = MessengerConfig {
            extension_id: "ext-1".to_string(),
            connect_attempts: 1,
            ..MessengerConfig::default()
        };
        let messenger = Messenger::new(
            config,
            NoHost {
                attempts: attempts.clone(),
            },
        );
        (messenger, attempts)
    }

    fn sender(id: &str) -> UiSender {
        UiSender {
            id: id.to_string(),
            tab_id: Some(7),
            url: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_sender_is_rejected_without_dispatch() {
        let (messenger, attempts) = messenger();

        let response = messenger
            .handle_ui_request(
                &sender("evil-extension"),
                UiRequest::SearchPassword {
                    domain: "example.com".to_string(),
                },
            )
            .await;

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Unauthorized sender"));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_domain_is_rejected_without_dispatch() {
        let (messenger, attempts) = messenger();

        let response = messenger
            .handle_ui_request(
                &sender("ext-1"),
                UiRequest::SearchPassword {
                    domain: "bad domain!".to_string(),
                },
            )
            .await;

        assert!(!response.success);
        assert!(response.error.unwrap().contains("Invalid domain"));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_save_requires_password() {
        let (messenger, attempts) = messenger();

        let response = messenger
            .handle_ui_request(
                &sender("ext-1"),
                UiRequest::SavePassword {
                    domain: "example.com".to_string(),
                    username: "alice".to_string(),
                    password: SecretString::default(),
                },
            )
            .await;

        assert_eq!(
            response.error.as_deref(),
            Some("Invalid input: Password required")
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_reports_unreachable_host() {
        let (messenger, attempts) = messenger();

        let response = messenger
            .handle_ui_request(
                &sender("ext-1"),
                UiRequest::SearchPassword {
                    domain: "example.com".to_string(),
                },
            )
            .await;

        assert!(!response.success);
        assert!(response.error.unwrap().contains("Native host unavailable"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_check_status_while_disconnected() {
        let (messenger, _) = messenger();

        let response = messenger
            .handle_ui_request(&sender("ext-1"), UiRequest::CheckStatus)
            .await;

        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["connected"], false);
        assert_eq!(data["state"], "disconnected");
        assert_eq!(data["badge"], "disconnected");
        assert_eq!(messenger.badge(), Badge::Disconnected);
    }

    #[tokio::test]
    async fn test_fill_credentials_uses_page_relay() {
        let (messenger, _) = messenger();
        let relay = Arc::new(RecordingRelay::default());
        messenger.set_page_relay(relay.clone());

        let response = messenger
            .handle_ui_request(
                &sender("ext-1"),
                UiRequest::FillCredentials {
                    tab_id: None,
                    username: "alice".to_string(),
                    password: SecretString::from("pw"),
                },
            )
            .await;

        assert!(response.success, "{:?}", response.error);
        let fills = relay.fills.lock().unwrap();
        assert_eq!(fills.as_slice(), &[(7, "alice".to_string(), "pw".to_string())]);
    }

    #[tokio::test]
    async fn test_fill_without_relay_fails() {
        let (messenger, _) = messenger();

        let response = messenger
            .handle_ui_request(
                &sender("ext-1"),
                UiRequest::FillCredentials {
                    tab_id: Some(3),
                    username: "alice".to_string(),
                    password: SecretString::from("pw"),
                },
            )
            .await;

        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_captured_credential_is_held_once() {
        let (messenger, _) = messenger();

        let response = messenger
            .handle_ui_request(
                &sender("ext-1"),
                UiRequest::CredentialCaptured {
                    domain: "Example.COM".to_string(),
                    username: "alice".to_string(),
                    password: SecretString::from("pw"),
                },
            )
            .await;
        assert!(response.success);

        let captured = messenger.take_captured().unwrap();
        assert_eq!(captured.domain, "example.com");
        assert_eq!(captured.password.expose(), "pw");
        assert!(messenger.take_captured().is_none());
    }

    #[test]
    fn test_request_wire_format() {
        let request: UiRequest = serde_json::from_str(
            r#"{"type":"FILL_CREDENTIALS","tabId":12,"username":"bob","password":"x"}"#,
        )
        .unwrap();
        match request {
            UiRequest::FillCredentials {
                tab_id, username, ..
            } => {
                assert_eq!(tab_id, Some(12));
                assert_eq!(username, "bob");
            }
            other => panic!("unexpected request {:?}", other),
        }

        let status: UiRequest = serde_json::from_str(r#"{"type":"CHECK_STATUS"}"#).unwrap();
        assert!(matches!(status, UiRequest::CheckStatus));
    }
}
