//! In-memory vault used by the standalone bridge binary and the tests.

use super::{SaveCompleted, SearchCompleted, VaultController};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use vaultlink_core::{AppStatus, Credential, SecretString};

/// Credentials keyed by lowercase domain. Clones share storage.
#[derive(Clone, Default)]
pub struct MemoryVault {
    entries: Arc<RwLock<HashMap<String, Vec<Credential>>>>,
    locked: Arc<AtomicBool>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Add or replace the credential for `credential.username` on `domain`.
    /// Returns `true` when an existing entry was replaced.
    pub fn insert(&self, domain: &str, credential: Credential) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let list = entries.entry(domain.to_ascii_lowercase()).or_default();

        match list.iter_mut().find(|c| c.username == credential.username) {
            Some(existing) => {
                *existing = credential;
                true
            }
            None => {
                list.push(credential);
                false
            }
        }
    }

    /// Credentials stored for `domain` or any parent domain of it.
    pub fn find(&self, domain: &str) -> Vec<Credential> {
        let domain = domain.to_ascii_lowercase();
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        entries
            .iter()
            .filter(|(stored, _)| {
                domain == **stored
                    || domain
                        .strip_suffix(stored.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .flat_map(|(_, list)| list.iter().cloned())
            .collect()
    }

    fn app_status(&self) -> AppStatus {
        if self.is_locked() {
            AppStatus::Locked
        } else {
            AppStatus::Unlocked
        }
    }
}

impl VaultController for MemoryVault {
    async fn search(&self, domain: String) -> SearchCompleted {
        let results = if self.is_locked() {
            Vec::new()
        } else {
            self.find(&domain)
        };

        SearchCompleted {
            results,
            app_status: self.app_status(),
        }
    }

    async fn save(&self, domain: String, username: String, password: SecretString) -> SaveCompleted {
        if self.is_locked() {
            return SaveCompleted {
                ok: false,
                message: "Vault is locked".to_string(),
            };
        }

        let credential = Credential {
            id: None,
            title: Some(domain.clone()),
            username,
            password,
            url: Some(format!("https://{}", domain)),
        };
        let message = if self.insert(&domain, credential) {
            "Credential updated"
        } else {
            "Credential saved"
        };

        SaveCompleted {
            ok: true,
            message: message.to_string(),
        }
    }
}
