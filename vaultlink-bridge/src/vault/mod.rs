//! Event-based correlation with the desktop vault.
//!
//! The bridge never calls the vault directly. For each request it registers
//! a waiter keyed by `requestId`, emits a [`VaultEvent`], and waits for the
//! matching completion or the timeout, whichever comes first.

mod memory;

pub use memory::MemoryVault;

use std::future::Future;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vaultlink_core::{AppStatus, Credential, PendingMap, SecretString};

/// Requests emitted towards the vault
#[derive(Debug)]
pub enum VaultEvent {
    SearchRequested {
        request_id: String,
        domain: String,
    },
    SaveRequested {
        request_id: String,
        domain: String,
        username: String,
        password: SecretString,
    },
}

#[derive(Debug, Clone)]
pub struct SearchCompleted {
    pub results: Vec<Credential>,
    pub app_status: AppStatus,
}

#[derive(Debug, Clone)]
pub struct SaveCompleted {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("vault not attached")]
    NotReady,
    #[error("request already in flight")]
    Duplicate,
    #[error("vault did not answer in time")]
    Timeout,
}

/// The two vault operations the bridge depends on.
pub trait VaultController: Send + Sync + 'static {
    fn search(&self, domain: String) -> impl Future<Output = SearchCompleted> + Send;

    fn save(
        &self,
        domain: String,
        username: String,
        password: SecretString,
    ) -> impl Future<Output = SaveCompleted> + Send;
}

pub struct VaultBridge {
    searches: PendingMap<SearchCompleted>,
    saves: PendingMap<SaveCompleted>,
    /// Held across the duplicate check and the insert, which span both maps
    registration: Mutex<()>,
    events: RwLock<Option<mpsc::UnboundedSender<VaultEvent>>>,
    timeout: Duration,
}

impl VaultBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            searches: PendingMap::new(),
            saves: PendingMap::new(),
            registration: Mutex::new(()),
            events: RwLock::new(None),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a vault is listening for events
    pub fn is_ready(&self) -> bool {
        self.events
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Start receiving vault events, replacing any previous listener.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<VaultEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tx);
        rx
    }

    /// Stop emitting events. Requests already waiting run into their
    /// timeout.
    pub fn detach(&self) {
        self.events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    pub fn complete_search(&self, request_id: &str, completed: SearchCompleted) -> bool {
        let settled = self.searches.settle(request_id, completed);
        if !settled {
            debug!(request_id, "Search completed after its request was settled");
        }
        settled
    }

    pub fn complete_save(&self, request_id: &str, completed: SaveCompleted) -> bool {
        let settled = self.saves.settle(request_id, completed);
        if !settled {
            debug!(request_id, "Save completed after its request was settled");
        }
        settled
    }

    /// Number of requests waiting on the vault
    pub fn in_flight(&self) -> usize {
        self.searches.len() + self.saves.len()
    }

    pub async fn search(
        &self,
        request_id: &str,
        domain: String,
    ) -> Result<SearchCompleted, VaultError> {
        let receiver = self.register(&self.searches, request_id)?;
        self.emit(
            &self.searches,
            request_id,
            VaultEvent::SearchRequested {
                request_id: request_id.to_string(),
                domain,
            },
        )?;
        self.searches
            .wait(request_id, receiver, self.timeout)
            .await
            .map_err(|_| VaultError::Timeout)
    }

    pub async fn save(
        &self,
        request_id: &str,
        domain: String,
        username: String,
        password: SecretString,
    ) -> Result<SaveCompleted, VaultError> {
        let receiver = self.register(&self.saves, request_id)?;
        self.emit(
            &self.saves,
            request_id,
            VaultEvent::SaveRequested {
                request_id: request_id.to_string(),
                domain,
                username,
                password,
            },
        )?;
        self.saves
            .wait(request_id, receiver, self.timeout)
            .await
            .map_err(|_| VaultError::Timeout)
    }

    fn register<T>(
        &self,
        waiters: &PendingMap<T>,
        request_id: &str,
    ) -> Result<tokio::sync::oneshot::Receiver<T>, VaultError> {
        let _registering = self
            .registration
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.searches.contains(request_id) || self.saves.contains(request_id) {
            return Err(VaultError::Duplicate);
        }
        waiters.register(request_id).ok_or(VaultError::Duplicate)
    }

    fn emit<T>(
        &self,
        waiters: &PendingMap<T>,
        request_id: &str,
        event: VaultEvent,
    ) -> Result<(), VaultError> {
        let sent = match &*self
            .events
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        };

        if !sent {
            waiters.cancel(request_id);
            return Err(VaultError::NotReady);
        }
        Ok(())
    }
}

/// Serve vault events with `controller` until the bridge detaches or is
/// dropped. Each event is handled on its own task.
pub fn attach_controller<C: VaultController>(
    bridge: &Arc<VaultBridge>,
    controller: C,
) -> JoinHandle<()> {
    let mut events = bridge.subscribe();
    let bridge: Weak<VaultBridge> = Arc::downgrade(bridge);
    let controller = Arc::new(controller);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let controller = Arc::clone(&controller);
            let bridge = bridge.clone();
            tokio::spawn(async move {
                match event {
                    VaultEvent::SearchRequested { request_id, domain } => {
                        let completed = controller.search(domain).await;
                        if let Some(bridge) = bridge.upgrade() {
                            bridge.complete_search(&request_id, completed);
                        }
                    }
                    VaultEvent::SaveRequested {
                        request_id,
                        domain,
                        username,
                        password,
                    } => {
                        let completed = controller.save(domain, username, password).await;
                        if let Some(bridge) = bridge.upgrade() {
                            bridge.complete_save(&request_id, completed);
                        }
                    }
                }
            });
        }
        warn!("Vault controller detached");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(username: &str) -> Credential {
        Credential {
            id: None,
            title: None,
            username: username.to_string(),
            password: SecretString::from("pw"),
            url: None,
        }
    }

    #[tokio::test]
    async fn test_not_ready_without_listener() {
        let bridge = VaultBridge::new(Duration::from_secs(1));

        assert!(!bridge.is_ready());
        let err = bridge.search("r1", "example.com".into()).await.unwrap_err();
        assert_eq!(err, VaultError::NotReady);
        assert_eq!(bridge.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_event_completion_settles_request() {
        let bridge = Arc::new(VaultBridge::new(Duration::from_secs(1)));
        let mut events = bridge.subscribe();
        assert!(bridge.is_ready());

        let waiter = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.search("r1", "example.com".into()).await })
        };

        match events.recv().await.unwrap() {
            VaultEvent::SearchRequested { request_id, domain } => {
                assert_eq!(request_id, "r1");
                assert_eq!(domain, "example.com");
                assert!(bridge.complete_search(
                    &request_id,
                    SearchCompleted {
                        results: vec![credential("alice")],
                        app_status: AppStatus::Unlocked,
                    },
                ));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let completed = waiter.await.unwrap().unwrap();
        assert_eq!(completed.results[0].username, "alice");
        assert_eq!(bridge.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_disarms_late_completion() {
        let bridge = VaultBridge::new(Duration::from_secs(4));
        let _events = bridge.subscribe();

        let started = tokio::time::Instant::now();
        let err = bridge
            .save(
                "r2",
                "example.com".into(),
                "alice".into(),
                SecretString::from("pw"),
            )
            .await
            .unwrap_err();

        assert_eq!(err, VaultError::Timeout);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(5));
        assert!(!bridge.complete_save(
            "r2",
            SaveCompleted {
                ok: true,
                message: "late".into(),
            },
        ));
        assert_eq!(bridge.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_request_id_is_refused() {
        let bridge = Arc::new(VaultBridge::new(Duration::from_secs(1)));
        let mut events = bridge.subscribe();

        let first = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.search("dup", "example.com".into()).await })
        };
        events.recv().await.unwrap();

        let err = bridge
            .save("dup", "example.com".into(), "a".into(), SecretString::from("b"))
            .await
            .unwrap_err();
        assert_eq!(err, VaultError::Duplicate);

        bridge.complete_search(
            "dup",
            SearchCompleted {
                results: Vec::new(),
                app_status: AppStatus::Locked,
            },
        );
        assert!(first.await.unwrap().is_ok());
    }

    #[test]
    fn test_concurrent_search_and_save_cannot_share_an_id() {
        let bridge = VaultBridge::new(Duration::from_secs(1));

        for round in 0..200 {
            let request_id = format!("race-{}", round);
            let start = std::sync::Barrier::new(2);

            let (search, save) = std::thread::scope(|scope| {
                let search = scope.spawn(|| {
                    start.wait();
                    bridge.register(&bridge.searches, &request_id).is_ok()
                });
                let save = scope.spawn(|| {
                    start.wait();
                    bridge.register(&bridge.saves, &request_id).is_ok()
                });
                (search.join().unwrap(), save.join().unwrap())
            });

            assert!(search ^ save, "round {}: search={} save={}", round, search, save);
            assert_eq!(bridge.in_flight(), 1);
            bridge.searches.cancel(&request_id);
            bridge.saves.cancel(&request_id);
        }
    }

    #[tokio::test]
    async fn test_detach_makes_bridge_unready() {
        let bridge = Arc::new(VaultBridge::new(Duration::from_secs(1)));
        let handle = attach_controller(&bridge, MemoryVault::new());
        assert!(bridge.is_ready());

        bridge.detach();
        handle.await.unwrap();

        assert!(!bridge.is_ready());
    }

    #[tokio::test]
    async fn test_attached_controller_answers() {
        let bridge = Arc::new(VaultBridge::new(Duration::from_secs(1)));
        let vault = MemoryVault::new();
        vault.insert("example.com", credential("alice"));
        let _handle = attach_controller(&bridge, vault);

        let found = bridge.search("r3", "example.com".into()).await.unwrap();
        assert_eq!(found.app_status, AppStatus::Unlocked);
        assert_eq!(found.results.len(), 1);

        let saved = bridge
            .save("r4", "example.com".into(), "bob".into(), SecretString::from("x"))
            .await
            .unwrap();
        assert!(saved.ok);
    }
}
