//! Native messaging host.
//!
//! Speaks the framed protocol with the browser on stdin/stdout and turns
//! every SEARCH or SAVE into one HTTP call to the desktop bridge. Messages
//! are decoded one at a time, but the HTTP calls they trigger run
//! concurrently and replies are written back as each completes.

mod client;

pub use client::BridgeClient;

use crate::platform::{get_port_file_path, read_port_file};
use crate::protocol::{
    write_frame, Action, FrameDecoder, Message, DEFAULT_BRIDGE_PORT, HOST_MAX_FRAME,
    NATIVE_HOST_IDENTITY,
};
use crate::{BridgeError, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Environment variable overriding the bridge base URL
pub const BRIDGE_URL_ENV: &str = "VAULTLINK_BRIDGE_URL";

/// Environment variable overriding the HTTP timeout in milliseconds
pub const HTTP_TIMEOUT_ENV: &str = "VAULTLINK_HTTP_TIMEOUT_MS";

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(4);

/// Action name used for the frame sent when the host dies
pub const FATAL_ACTION: &str = "ERROR";

/// Native host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Bridge base URL, e.g. `http://127.0.0.1:17865`
    pub bridge_url: String,
    pub http_timeout: Duration,
    pub max_frame_len: usize,
    pub identity: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::for_port(DEFAULT_BRIDGE_PORT)
    }
}

impl HostConfig {
    pub fn for_port(port: u16) -> Self {
        Self {
            bridge_url: format!("http://127.0.0.1:{}", port),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            max_frame_len: HOST_MAX_FRAME,
            identity: NATIVE_HOST_IDENTITY.to_string(),
        }
    }

    /// Resolve the configuration the browser-launched host runs with:
    /// explicit URL from the environment, else the port recorded by the
    /// bridge, else the default port.
    pub fn from_env() -> Self {
        let mut config = match read_port_file(&get_port_file_path()) {
            Some(port) => Self::for_port(port),
            None => Self::default(),
        };

        if let Ok(url) = std::env::var(BRIDGE_URL_ENV) {
            let trimmed = url.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                config.bridge_url = trimmed.to_string();
            }
        }

        if let Some(ms) = std::env::var(HTTP_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.http_timeout = Duration::from_millis(ms);
        }

        config
    }
}

/// Native messaging host for communication with the browser
pub struct NativeMessagingHost {
    config: HostConfig,
    client: BridgeClient,
}

impl NativeMessagingHost {
    pub fn new(config: HostConfig) -> Result<Self> {
        let client = BridgeClient::new(&config)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Run on the process's standard streams.
    pub async fn run_stdio(&self) -> Result<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one channel until `reader` reaches end of stream.
    ///
    /// Returns an error when input can no longer be read, when replies can
    /// no longer be written, or when a bridge call task panics. Replies
    /// already queued are flushed before a read or task failure is
    /// returned, so the output ends on a frame boundary.
    pub async fn run<R, W>(&self, mut reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (replies, outbox) = mpsc::unbounded_channel();
        let mut writer_task = tokio::spawn(write_replies(writer, outbox));
        let mut calls = JoinSet::new();

        let _ = replies.send(Message::new(String::new(), Action::Ready));
        info!(bridge = %self.client.endpoint(), "Native messaging host ready");

        let mut decoder = FrameDecoder::new(self.config.max_frame_len);
        let mut chunk = vec![0u8; 8 * 1024];

        let failure = loop {
            tokio::select! {
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => {
                        info!("Input channel closed, shutting down");
                        break None;
                    }
                    Ok(n) => {
                        for decoded in decoder.push(&chunk[..n]) {
                            match decoded {
                                Ok(message) => self.dispatch(message, &replies, &mut calls),
                                Err(e) => warn!("Dropping inbound frame: {}", e),
                            }
                        }
                    }
                    Err(e) => break Some(BridgeError::Io(e)),
                },
                Some(joined) = calls.join_next() => {
                    if let Some(e) = call_failure(joined) {
                        break Some(e);
                    }
                }
                finished = &mut writer_task => {
                    return match finished {
                        Ok(result) => result,
                        Err(e) => Err(task_error("reply writer", e)),
                    };
                }
            }
        };

        let Some(failure) = failure else {
            writer_task.abort();
            return Ok(());
        };

        error!("Native messaging host failing: {}", failure);
        calls.shutdown().await;
        drop(replies);
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Reply writer failed while draining: {}", e),
            Err(e) => warn!("Reply writer failed while draining: {}", e),
        }
        Err(failure)
    }

    fn dispatch(
        &self,
        mut message: Message,
        replies: &mpsc::UnboundedSender<Message>,
        calls: &mut JoinSet<()>,
    ) {
        debug!(request_id = %message.request_id, action = %message.action, "Received message");

        match message.action {
            Action::Ping => {
                let _ = replies.send(Message::reply_to(&message, Action::Pong));
            }
            Action::Search | Action::Save => {
                if let Err(missing) = check_required(&message) {
                    message.clear_password();
                    let _ = replies.send(Message::failure(
                        message.request_id.clone(),
                        message.action.clone(),
                        missing,
                    ));
                    return;
                }

                let client = self.client.clone();
                let replies = replies.clone();
                calls.spawn(async move {
                    let reply = forward(&client, message).await;
                    let _ = replies.send(reply);
                });
            }
            _ => {
                let _ = replies.send(Message::failure(
                    message.request_id.clone(),
                    message.action.clone(),
                    format!("Unknown command: {}", message.action),
                ));
            }
        }
    }
}

/// Message sent on a best-effort basis when the host is about to die.
pub fn fatal_message(error: &str) -> Message {
    Message::failure(
        String::new(),
        Action::Other(FATAL_ACTION.to_string()),
        error.to_string(),
    )
}

fn task_error(task: &str, e: JoinError) -> BridgeError {
    BridgeError::Io(std::io::Error::other(format!("{} task failed: {}", task, e)))
}

/// A bridge call that panicked is fatal; a cancelled one is not.
fn call_failure(joined: std::result::Result<(), JoinError>) -> Option<BridgeError> {
    match joined {
        Err(e) if e.is_panic() => Some(task_error("bridge call", e)),
        _ => None,
    }
}

fn check_required(message: &Message) -> std::result::Result<(), &'static str> {
    let present = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());

    match message.action {
        Action::Search if !present(&message.domain) => Err("Domain required"),
        Action::Save
            if !present(&message.domain)
                || !present(&message.username)
                || message.password.as_ref().map_or(true, |p| p.is_empty()) =>
        {
            Err("Domain, username and password required")
        }
        _ => Ok(()),
    }
}

async fn forward(client: &BridgeClient, mut request: Message) -> Message {
    let outcome = client.forward(&request).await;
    request.clear_password();

    let reply = match outcome {
        Ok(reply) => reply,
        Err(e) => {
            warn!(request_id = %request.request_id, "Bridge call failed: {}", e);
            return Message::failure(request.request_id.clone(), request.action.clone(), e.to_string());
        }
    };

    let mut message = Message::reply_to(&request, request.action.clone());
    message.error = reply.error;
    match request.action {
        Action::Search => {
            message.results = Some(reply.results.unwrap_or_default());
            message.app_status = reply.app_status;
        }
        Action::Save => {
            message.ok = reply.ok;
            message.message = reply.message;
        }
        _ => {}
    }
    message
}

async fn write_replies<W>(mut writer: W, mut outbox: mpsc::UnboundedReceiver<Message>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = outbox.recv().await {
        write_frame(&mut writer, &reply).await?;
    }
    Ok(())
}
