//! Extension messenger → native host → bridge → vault, in one process.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, split};
use vaultlink_bridge::{
    attach_controller, start, BridgeConfig, RunningBridge, SaveCompleted, SearchCompleted,
    VaultBridge, VaultController,
};
use vaultlink_core::messenger::{Connector, NativePort, RequestData, UiRequest, UiSender};
use vaultlink_core::{
    Action, AppStatus, BoxFuture, BridgeError, Credential, HostConfig, Messenger,
    MessengerConfig, NativeMessagingHost, SecretString,
};

/// Answers searches, never answers saves.
struct PartialVault;

impl VaultController for PartialVault {
    async fn search(&self, domain: String) -> SearchCompleted {
        SearchCompleted {
            results: vec![Credential {
                id: Some("42".to_string()),
                title: Some(domain.clone()),
                username: "alice".to_string(),
                password: SecretString::from("hunter2"),
                url: Some(format!("https://{}", domain)),
            }],
            app_status: AppStatus::Unlocked,
        }
    }

    async fn save(&self, _domain: String, _username: String, _password: SecretString) -> SaveCompleted {
        std::future::pending().await
    }
}

/// Runs a native host task per channel instead of spawning the binary.
struct InProcessHost {
    config: HostConfig,
}

impl Connector for InProcessHost {
    fn open(&self) -> BoxFuture<'_, io::Result<NativePort>> {
        Box::pin(async move {
            let host = NativeMessagingHost::new(self.config.clone())
                .map_err(|e| io::Error::other(e.to_string()))?;
            let (extension_side, host_side) = duplex(64 * 1024);
            let (host_reader, host_writer) = split(host_side);
            tokio::spawn(async move {
                let _ = host.run(host_reader, host_writer).await;
            });

            let (reader, writer) = split(extension_side);
            Ok(NativePort::new(reader, writer))
        })
    }
}

async fn start_bridge(vault_timeout: Duration) -> (RunningBridge, Arc<VaultBridge>) {
    let config = BridgeConfig {
        base_port: 0,
        write_port_file: false,
        vault_timeout_ms: vault_timeout.as_millis() as u64,
        ..BridgeConfig::default()
    };
    let vault = Arc::new(VaultBridge::new(config.vault_timeout()));
    attach_controller(&vault, PartialVault);
    let bridge = start(config, vault.clone()).await.unwrap();
    (bridge, vault)
}

fn messenger_for(bridge: &RunningBridge) -> Messenger {
    let config = MessengerConfig {
        extension_id: "e2e-extension".to_string(),
        ..MessengerConfig::default()
    };
    Messenger::new(
        config,
        InProcessHost {
            config: HostConfig::for_port(bridge.port()),
        },
    )
}

#[tokio::test]
async fn test_search_flows_through_every_hop() {
    let (bridge, _vault) = start_bridge(Duration::from_secs(4)).await;
    let messenger = messenger_for(&bridge);

    let reply = messenger
        .send_message(Action::Search, RequestData::search("example.com"))
        .await
        .unwrap();

    assert_eq!(reply.action, Action::Search);
    assert_eq!(reply.app_status, Some(AppStatus::Unlocked));
    let results = reply.results.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].username, "alice");
    assert_eq!(results[0].password.expose(), "hunter2");
    assert_eq!(messenger.pending_count(), 0);

    messenger.disconnect().await;
    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unanswered_save_times_out_at_the_bridge() {
    let (bridge, vault) = start_bridge(Duration::from_millis(500)).await;
    let messenger = messenger_for(&bridge);

    let err = messenger
        .send_message(
            Action::Save,
            RequestData::save("example.com", "alice", SecretString::from("pw")),
        )
        .await
        .unwrap_err();

    // The bridge's 408 is relayed before the host or messenger give up
    match err {
        BridgeError::Remote(message) => assert!(message.contains("did not respond"), "{}", message),
        other => panic!("expected relayed bridge timeout, got {:?}", other),
    }
    assert_eq!(vault.in_flight(), 0);

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ui_search_reports_results() {
    let (bridge, _vault) = start_bridge(Duration::from_secs(4)).await;
    let messenger = messenger_for(&bridge);
    let sender = UiSender {
        id: "e2e-extension".to_string(),
        tab_id: Some(1),
        url: Some("https://example.com/login".to_string()),
    };

    let response = messenger
        .handle_ui_request(
            &sender,
            UiRequest::SearchPassword {
                domain: "example.com".to_string(),
            },
        )
        .await;

    assert!(response.success, "{:?}", response.error);
    let data = response.data.unwrap();
    assert_eq!(data["results"][0]["username"], "alice");
    assert_eq!(data["appStatus"], "unlocked");

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bridge_down_is_reported_to_the_caller() {
    let (bridge, _vault) = start_bridge(Duration::from_secs(4)).await;
    let messenger = messenger_for(&bridge);
    bridge.shutdown().await.unwrap();

    let err = messenger
        .send_message(Action::Search, RequestData::search("example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Remote(_)), "{:?}", err);
}
