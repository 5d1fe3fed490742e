//! Opening the native messaging channel.

use crate::platform::resolve_host_binary;
use crate::BoxFuture;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open channel to a native host.
pub struct NativePort {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    /// Host process backing the channel, killed when the port is dropped
    pub child: Option<Child>,
}

impl NativePort {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        }
    }

    pub fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }
}

/// Opens native messaging channels for a [`Messenger`](super::Messenger).
pub trait Connector: Send + Sync + 'static {
    fn open(&self) -> BoxFuture<'_, io::Result<NativePort>>;
}

/// Launches the native host binary and talks to it over its stdio.
pub struct ProcessConnector {
    program: PathBuf,
    args: Vec<String>,
}

impl Default for ProcessConnector {
    fn default() -> Self {
        Self::new(resolve_host_binary())
    }
}

impl ProcessConnector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Connector for ProcessConnector {
    fn open(&self) -> BoxFuture<'_, io::Result<NativePort>> {
        Box::pin(async move {
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    io::Error::new(
                        e.kind(),
                        format!("Failed to start {}: {}", self.program.display(), e),
                    )
                })?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| io::Error::other("native host stdin unavailable"))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| io::Error::other("native host stdout unavailable"))?;

            Ok(NativePort::new(stdout, stdin).with_child(child))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_fails_to_open() {
        let connector = ProcessConnector::new("/nonexistent/vaultlink-host");
        let err = connector.open().await.err().unwrap();

        assert!(err.to_string().contains("/nonexistent/vaultlink-host"));
    }
}
