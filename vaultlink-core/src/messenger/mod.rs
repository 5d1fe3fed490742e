//! Extension-side messenger.
//!
//! A [`Messenger`] owns one native messaging channel: its connection state
//! machine, the map of requests awaiting replies and the status badge shown
//! to the user. Requests are correlated with replies purely by `requestId`,
//! so replies may arrive in any order.

mod connector;
mod ui;

pub use connector::{BoxedReader, BoxedWriter, Connector, NativePort, ProcessConnector};
pub use ui::{CapturedCredential, PageRelay, UiRequest, UiResponse, UiSender};

use crate::pending::PendingMap;
use crate::protocol::{
    write_frame, Action, AppStatus, FrameDecoder, Message, RequestIdGenerator, HOST_MAX_FRAME,
};
use crate::secret::SecretString;
use crate::{BridgeError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_EXTENSION_ID: &str = "vaultlink@extension";

/// Messenger configuration
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// How long a request waits for its reply
    pub request_timeout: Duration,
    /// Attempts made to open the channel before giving up
    pub connect_attempts: u32,
    /// Fixed delay between connection attempts
    pub retry_delay: Duration,
    /// Only UI requests from this sender are served
    pub extension_id: String,
    pub max_frame_len: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            extension_id: DEFAULT_EXTENSION_ID.to_string(),
            max_frame_len: HOST_MAX_FRAME,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Indicator shown on the extension icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Badge {
    Disconnected,
    Connected,
    Locked,
}

/// Optional fields carried by an outgoing request
#[derive(Debug, Default)]
pub struct RequestData {
    pub domain: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl RequestData {
    pub fn search(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Self::default()
        }
    }

    pub fn save(domain: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            domain: Some(domain.into()),
            username: Some(username.into()),
            password: Some(password),
        }
    }

    fn into_message(self, request_id: String, action: Action) -> Message {
        let mut message = Message::new(request_id, action);
        message.domain = self.domain;
        message.username = self.username;
        message.password = self.password;
        message
    }
}

/// The live channel. Dropping it stops its reader and, for process
/// channels, kills the host.
struct Link {
    epoch: u64,
    writer: BoxedWriter,
    reader_task: JoinHandle<()>,
    _child: Option<Child>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

struct Inner {
    config: MessengerConfig,
    connector: Box<dyn Connector>,
    state: Mutex<ConnectionState>,
    link: AsyncMutex<Option<Link>>,
    connect_gate: AsyncMutex<()>,
    epoch: AtomicU64,
    pending: PendingMap<Result<Message>>,
    ids: RequestIdGenerator,
    badge: watch::Sender<Badge>,
    relay: RwLock<Option<Arc<dyn PageRelay>>>,
    captured: Mutex<Option<CapturedCredential>>,
}

/// Connection manager for the native messaging channel. Clones share the
/// same channel.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<Inner>,
}

impl Messenger {
    pub fn new(config: MessengerConfig, connector: impl Connector) -> Self {
        let (badge, _) = watch::channel(Badge::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector: Box::new(connector),
                state: Mutex::new(ConnectionState::Disconnected),
                link: AsyncMutex::new(None),
                connect_gate: AsyncMutex::new(()),
                epoch: AtomicU64::new(0),
                pending: PendingMap::new(),
                ids: RequestIdGenerator::new(),
                badge,
                relay: RwLock::new(None),
                captured: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &MessengerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state()
    }

    pub fn badge(&self) -> Badge {
        *self.inner.badge.borrow()
    }

    /// Watch badge changes
    pub fn subscribe_badge(&self) -> watch::Receiver<Badge> {
        self.inner.badge.subscribe()
    }

    /// Number of requests still awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Open the channel unless one is already open.
    ///
    /// Concurrent callers share a single attempt; nobody opens a second
    /// channel while one is being established.
    pub async fn connect(&self) -> Result<()> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        let _gate = self.inner.connect_gate.lock().await;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        self.inner.set_state(ConnectionState::Connecting);
        let attempts = self.inner.config.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.open_channel().await {
                Ok(()) => {
                    info!(attempt, "Connected to native host");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, "Failed to connect to native host: {}", e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.inner.config.retry_delay).await;
                    }
                }
            }
        }

        self.inner.mark_disconnected();
        Err(BridgeError::Connection(format!(
            "Native host unavailable after {} attempts: {}",
            attempts, last_error
        )))
    }

    /// Close the channel, rejecting everything still pending.
    pub async fn disconnect(&self) {
        if let Some(rejected) = self.inner.drop_link("Disconnected from native host").await {
            info!(rejected, "Disconnected from native host");
        }
    }

    /// Send one request and wait for its correlated reply.
    ///
    /// A reply carrying `error` is returned as [`BridgeError::Remote`].
    pub async fn send_message(&self, action: Action, data: RequestData) -> Result<Message> {
        self.connect().await?;

        let budget = self.inner.config.request_timeout;
        let deadline = Instant::now() + budget;
        let request_id = self.inner.ids.next_id();
        let receiver = self.inner.pending.register(&request_id).ok_or_else(|| {
            BridgeError::Protocol(format!("duplicate request id {}", request_id))
        })?;

        // The write shares the reply deadline: a host that stops reading
        // must not hold the caller past it.
        let mut message = data.into_message(request_id.clone(), action);
        let sent = tokio::time::timeout_at(deadline, self.inner.write(&message)).await;
        message.clear_password();
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.inner.pending.cancel(&request_id);
                return Err(e);
            }
            Err(_) => {
                self.inner.pending.cancel(&request_id);
                warn!(request_id = %request_id, "Write to native host stalled, dropping channel");
                self.inner.drop_link("Native host stopped reading").await;
                return Err(BridgeError::Timeout(budget));
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.inner.pending.wait(&request_id, receiver, remaining).await {
            Ok(outcome) => outcome,
            Err(BridgeError::Timeout(_)) => Err(BridgeError::Timeout(budget)),
            Err(e) => Err(e),
        }
    }

    /// Install the relay used for FILL_CREDENTIALS requests.
    pub fn set_page_relay(&self, relay: Arc<dyn PageRelay>) {
        *self
            .inner
            .relay
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(relay);
    }

    /// Take the most recently captured credential, if any.
    pub fn take_captured(&self) -> Option<CapturedCredential> {
        self.inner.captured().take()
    }

    async fn open_channel(&self) -> Result<()> {
        let NativePort {
            reader,
            mut writer,
            child,
        } = self.inner.connector.open().await?;

        let ping = Message::new(self.inner.ids.next_id(), Action::Ping);
        write_frame(&mut writer, &ping).await?;

        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let mut link = self.inner.link.lock().await;
        // Spawned under the lock so an immediate close cannot race the store.
        let reader_task = tokio::spawn(read_loop(Arc::downgrade(&self.inner), reader, epoch));
        *link = Some(Link {
            epoch,
            writer,
            reader_task,
            _child: child,
        });

        self.inner.set_state(ConnectionState::Connected);
        self.inner.badge.send_replace(Badge::Connected);
        Ok(())
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state();
        if *state != next {
            debug!(from = ?*state, to = ?next, "Connection state change");
            *state = next;
        }
    }

    fn mark_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
        self.badge.send_replace(Badge::Disconnected);
    }

    fn captured(&self) -> MutexGuard<'_, Option<CapturedCredential>> {
        self.captured.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn page_relay(&self) -> Option<Arc<dyn PageRelay>> {
        self.relay
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drop whatever channel is open and reject everything pending.
    /// Returns the number of rejected requests, or `None` if nothing was
    /// open.
    async fn drop_link(&self, reason: &str) -> Option<usize> {
        let closed = self.link.lock().await.take()?;

        self.mark_disconnected();
        let rejected = self
            .pending
            .settle_all(|| Err(BridgeError::Connection(reason.to_string())));
        drop(closed);
        Some(rejected)
    }

    async fn write(&self, message: &Message) -> Result<()> {
        let mut link = self.link.lock().await;
        let Some(active) = link.as_mut() else {
            return Err(BridgeError::Connection("Native host not connected".to_string()));
        };

        match write_frame(&mut active.writer, message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Write to native host failed, dropping channel: {}", e);
                let dropped = link.take();
                drop(link);
                self.mark_disconnected();
                drop(dropped);
                Err(BridgeError::Connection(format!(
                    "Failed to send to native host: {}",
                    e
                )))
            }
        }
    }

    fn handle_inbound(&self, message: Message) {
        self.observe_status(&message);

        if message.request_id.is_empty() {
            if !message.action.is_status() {
                debug!(action = %message.action, "Ignoring unsolicited message");
            }
            return;
        }

        let request_id = message.request_id.clone();
        let is_status = message.action.is_status();
        let outcome = match message.error.clone() {
            Some(error) => Err(BridgeError::Remote(error)),
            None => Ok(message),
        };

        if !self.pending.settle(&request_id, outcome) && !is_status {
            debug!(request_id = %request_id, "Ignoring reply with no pending request");
        }
    }

    fn observe_status(&self, message: &Message) {
        let next = match (&message.action, message.app_status) {
            (Action::AppLocked, _) | (_, Some(AppStatus::Locked)) => Badge::Locked,
            (Action::AppUnlocked, _) | (_, Some(AppStatus::Unlocked)) => Badge::Connected,
            (Action::Pong | Action::Ready, _) => {
                if *self.badge.borrow() != Badge::Disconnected {
                    return;
                }
                Badge::Connected
            }
            _ => return,
        };
        self.badge.send_replace(next);
    }

    async fn handle_disconnect(&self, epoch: u64, reason: &str) {
        let mut link = self.link.lock().await;
        if link.as_ref().map(|l| l.epoch) != Some(epoch) {
            debug!(epoch, "Ignoring close of a stale channel");
            return;
        }
        let closed = link.take();
        drop(link);

        self.mark_disconnected();
        let rejected = self.pending.settle_all(|| {
            Err(BridgeError::Connection(format!(
                "Native host disconnected: {}",
                reason
            )))
        });
        warn!(rejected, "Native host channel closed: {}", reason);
        drop(closed);
    }
}

async fn read_loop(inner: Weak<Inner>, mut reader: BoxedReader, epoch: u64) {
    let Some(max_frame_len) = inner.upgrade().map(|i| i.config.max_frame_len) else {
        return;
    };
    let mut decoder = FrameDecoder::new(max_frame_len);
    let mut chunk = vec![0u8; 8 * 1024];

    let reason = loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break "channel closed by native host".to_string(),
            Ok(n) => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                for decoded in decoder.push(&chunk[..n]) {
                    match decoded {
                        Ok(message) => inner.handle_inbound(message),
                        Err(e) => warn!("Dropping inbound frame: {}", e),
                    }
                }
            }
            Err(e) => break e.to_string(),
        }
    };

    if let Some(inner) = inner.upgrade() {
        inner.handle_disconnect(epoch, &reason).await;
    }
}
