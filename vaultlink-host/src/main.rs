use anyhow::Result;
use std::io::Write;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;
use vaultlink_core::host::fatal_message;
use vaultlink_core::protocol::encode_message;
use vaultlink_core::{BridgeError, HostConfig, NativeMessagingHost};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries frames
    let subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting VaultLink Native Messaging Host v{}", VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let outcome = runtime.block_on(async {
        let host = NativeMessagingHost::new(HostConfig::from_env())?;
        info!(bridge = %host.config().bridge_url, "Resolved bridge endpoint");

        // Spawned so a panic anywhere in the host surfaces here as an error
        match tokio::spawn(async move { host.run_stdio().await }).await {
            Ok(result) => result,
            Err(e) => Err(BridgeError::Io(std::io::Error::other(format!(
                "Native host crashed: {}",
                e
            )))),
        }
    });

    // Nothing else may write to stdout once the fatal frame goes out
    runtime.shutdown_timeout(Duration::from_millis(500));

    match outcome {
        Ok(()) => {
            info!("Native messaging host completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Native messaging host error: {}", e);
            write_fatal_frame(&e.to_string());
            std::process::exit(1);
        }
    }
}

/// Best-effort error frame written straight to stdout.
fn write_fatal_frame(error: &str) {
    if let Ok(frame) = encode_message(&fatal_message(error)) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(&frame);
        let _ = stdout.flush();
    }
}
