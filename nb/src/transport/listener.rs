//! Webhook listener
//!
//! Receives inbound updates as newline-delimited JSON over a Unix domain
//! socket and feeds each payload to the chat service. The upstream webhook
//! contract requires an affirmative receipt no matter what happened
//! internally, so every line is answered `{"ok":true}` - processing errors
//! are logged and swallowed here, never surfaced to the transport.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bot::ChatService;

/// Maximum accepted payload line
const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct WebhookAck {
    ok: bool,
}

/// Create and bind the webhook socket
///
/// Handles cleanup of stale socket files from previous runs.
pub fn create_listener_at(socket_path: &Path) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "create_listener_at: creating webhook socket");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    if socket_path.exists() {
        debug!(?socket_path, "create_listener_at: removing stale socket");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind webhook socket")?;
    Ok((listener, socket_path.to_path_buf()))
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "Failed to remove socket file");
        }
    }
}

/// Accept connections until the shutdown signal fires
pub async fn run_listener(
    listener: UnixListener,
    service: Arc<ChatService>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    info!("webhook listener started");
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("webhook listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        tokio::spawn(handle_connection(stream, Arc::clone(&service)));
                    }
                    Err(e) => warn!(error = %e, "failed to accept webhook connection"),
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, service: Arc<ChatService>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(n) => {
                let payload = line.trim();
                if payload.is_empty() {
                    continue;
                }
                if n > MAX_PAYLOAD_BYTES {
                    warn!(bytes = n, "oversized webhook payload dropped");
                } else if let Err(e) = service.handle_webhook(payload.as_bytes()).await {
                    // the ack below goes out regardless
                    warn!(error = %e, "webhook processing failed");
                }

                let ack = serde_json::to_string(&WebhookAck { ok: true }).expect("ack serializes");
                if write_half.write_all(ack.as_bytes()).await.is_err()
                    || write_half.write_all(b"\n").await.is_err()
                {
                    break;
                }
                let _ = write_half.flush().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to read webhook payload");
                break;
            }
        }
    }
}
