//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from browsers.
//! 3. Upgrading each connection to a WebSocket session.
//! 4. Registering the session with the bridge controller.
//! 5. Running two concurrent tasks per session:
//!    - **Reader**: parses JSON frames from the browser and forwards them to
//!      the controller as [`BridgeEvent::ClientRequest`]s.
//!    - **Writer**: drains the session outbox and sends each [`ServerMsg`]
//!      to the browser as a JSON text frame.
//! 6. Gracefully shutting down when the `running` flag is cleared.
//!
//! # Scalability
//!
//! Each browser session runs in its own Tokio task.  Tokio's multi-threaded
//! runtime distributes tasks across OS threads automatically.  The `run_server`
//! accept loop never blocks: it accepts a connection and immediately spawns
//! a new task for it before accepting the next one.  This means the bridge can
//! handle many simultaneous dashboard sessions limited only by available memory
//! and the OS's TCP stack.
//!
//! # Portability
//!
//! Uses only `tokio::net` APIs which are portable across Windows, Linux, and
//! macOS.  Shutdown is triggered by a shared `AtomicBool` that is set by a
//! Ctrl+C signal handler (see `main.rs`), which is also cross-platform.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::BridgeEvent;
use crate::domain::config::BridgeConfig;
use crate::domain::messages::ClientMsg;

/// Capacity of each session's outbox.
///
/// At full telemetry rate this is a fraction of a second of buffering; a
/// client that falls further behind than that gets messages dropped by the
/// controller rather than stalling everyone else.
const SESSION_OUTBOX_CAPACITY: usize = 128;

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the main WebSocket accept loop until `running` is set to `false`.
///
/// Binds a TCP listener on `config.ws_bind_addr` and accepts incoming
/// connections in a loop.  Each accepted connection is handed off to a
/// dedicated Tokio task so that one slow client never blocks others.
///
/// # Parameters
///
/// - `config`  – Bridge configuration (bind address).
/// - `running` – Shared flag; the loop exits when this is set to `false`.
/// - `events`  – Inbox of the bridge controller; cloned into every session.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: BridgeConfig,
    running: Arc<AtomicBool>,
    events: mpsc::Sender<BridgeEvent>,
) -> anyhow::Result<()> {
    // Bind the WebSocket TCP listener.
    // `TcpListener::bind` is the async equivalent of `bind()` + `listen()`.
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind WebSocket listener on {}",
                config.ws_bind_addr
            )
        })?;

    info!("serial bridge listening on {}", config.ws_bind_addr);

    loop {
        // Check the shutdown flag before each accept attempt.
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Use a short timeout on `accept()` so the loop can periodically check
        // the `running` flag even when no browsers are connecting.
        // Without this timeout, the loop would block forever on `accept()`.
        let accept_result = timeout(Duration::from_millis(200), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, peer_addr))) => {
                info!("new browser connection from {peer_addr}");
                let session_events = events.clone();

                // Spawn a dedicated Tokio task for this session.
                // `tokio::spawn` is non-blocking: it queues the task and returns
                // immediately, so the accept loop is never delayed by I/O.
                tokio::spawn(async move {
                    handle_browser_session(stream, peer_addr, session_events).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                // Log it and continue rather than crashing the whole bridge.
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout — no new connection in the last 200 ms.
                // Loop back to check the `running` flag.
            }
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Top-level handler for a single browser WebSocket session.
///
/// Wraps [`run_session`] and logs the outcome.  This function is the entry
/// point for each per-session Tokio task spawned by [`run_server`].
///
/// Using a separate outer/inner function pair lets us use `?` for clean error
/// propagation inside `run_session` while logging errors in this outer function.
async fn handle_browser_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    events: mpsc::Sender<BridgeEvent>,
) {
    match run_session(raw_stream, peer_addr, events).await {
        Ok(()) => info!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of a single browser WebSocket session.
///
/// This function:
///
/// 1. Completes the WebSocket HTTP upgrade handshake with the browser.
/// 2. Registers the session with the bridge controller under a fresh UUID.
/// 3. Runs two concurrent tasks:
///    - Writer: session outbox → JSON text frames
///    - Reader: JSON text frames → controller requests
/// 4. Returns when either task finishes, after telling the controller the
///    client is gone.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails or the controller is no
/// longer accepting sessions.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    events: mpsc::Sender<BridgeEvent>,
) -> anyhow::Result<()> {
    // ── Step 1: Complete the WebSocket handshake ───────────────────────────────
    //
    // `accept_async` reads the browser's HTTP Upgrade request and sends the
    // "101 Switching Protocols" response.  After this, `ws_stream` speaks
    // WebSocket frames instead of raw HTTP.
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    // ── Step 2: Register with the bridge controller ───────────────────────────
    //
    // The controller learns about this session before any request can reach
    // it, and gets the sender side of the outbox for replies and telemetry.
    let client_id = Uuid::new_v4();
    let (outbox_tx, mut outbox_rx) = mpsc::channel(SESSION_OUTBOX_CAPACITY);

    events
        .send(BridgeEvent::ClientConnected {
            client_id,
            outbound: outbox_tx,
        })
        .await
        .context("bridge controller is gone; cannot register session")?;

    info!("session {peer_addr}: registered as client {client_id}");

    // ── Step 3: Split the stream into read/write halves ────────────────────────
    //
    // Reading and writing happen in separate Tokio tasks, so each needs its
    // own half.  `ws_tx` is the sink (we write frames to it), `ws_rx` is the
    // stream (we read frames from it).
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Writer task: session outbox → browser ─────────────────────────────────
    //
    // Drains messages the controller queued for this client and sends each
    // as a JSON text frame.  Ends when the outbox closes (the controller
    // dropped the sender after a disconnect) or the browser stops reading.
    let mut writer_task = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json_str) => {
                    if ws_tx.send(WsMessage::Text(json_str)).await.is_err() {
                        debug!("session {client_id}: WebSocket send failed (browser disconnected)");
                        break;
                    }
                }
                Err(e) => {
                    error!("session {client_id}: JSON serialization error: {e}");
                }
            }
        }
    });

    // ── Reader task: browser → controller ─────────────────────────────────────
    //
    // Parses each JSON text frame into a `ClientMsg` and forwards it to the
    // controller.  A frame that does not parse is logged and skipped; the
    // session stays up.
    let reader_events = events.clone();
    let mut reader_task = tokio::spawn(async move {
        loop {
            // Read the next WebSocket frame from the browser.
            // `next()` returns `None` when the stream is closed.
            let ws_msg = match ws_rx.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("session {client_id}: browser WebSocket closed normally");
                    break;
                }
                Some(Err(e)) => {
                    warn!("session {client_id}: browser WebSocket error: {e}");
                    break;
                }
                None => {
                    debug!("session {client_id}: browser stream ended");
                    break;
                }
            };

            match ws_msg {
                WsMessage::Text(json_str) => {
                    // Parse the JSON request from the browser.
                    let request: ClientMsg = match serde_json::from_str(&json_str) {
                        Ok(m) => m,
                        Err(e) => {
                            warn!("session {client_id}: invalid JSON from browser: {e}");
                            // Don't close the session for one bad message; the
                            // browser might retry on the next interaction.
                            continue;
                        }
                    };

                    debug!(
                        "session {client_id}: browser request: {}",
                        request_type_name(&request)
                    );

                    if reader_events
                        .send(BridgeEvent::ClientRequest { client_id, request })
                        .await
                        .is_err()
                    {
                        debug!("session {client_id}: controller gone, closing session");
                        break;
                    }
                }

                WsMessage::Binary(_) => {
                    // The browser-facing protocol is JSON-only.
                    // Binary frames are unexpected; log and skip.
                    warn!("session {client_id}: unexpected binary WebSocket frame (ignored)");
                }

                WsMessage::Ping(data) => {
                    // WebSocket protocol-level ping.  tokio-tungstenite replies
                    // with the Pong automatically when writing to the sink.
                    debug!("session {client_id}: WebSocket ping ({} bytes)", data.len());
                }

                WsMessage::Pong(_) => {
                    debug!("session {client_id}: WebSocket pong received");
                }

                WsMessage::Close(_) => {
                    debug!("session {client_id}: WebSocket Close frame received");
                    break;
                }

                WsMessage::Frame(_) => {
                    debug!("session {client_id}: raw frame (ignored)");
                }
            }
        }
    });

    // ── Step 4: Wait for either task to finish ────────────────────────────────
    //
    // The session is over as soon as either direction stops: the browser
    // disconnected (reader ends) or stopped accepting writes (writer ends).
    tokio::select! {
        _ = &mut writer_task => {
            debug!("session {client_id}: writer task ended");
        }
        _ = &mut reader_task => {
            debug!("session {client_id}: reader task ended");
        }
    }

    // Tell the controller the client is gone.  This releases its port
    // attachment and drops the outbox sender, which in turn ends the writer
    // task if it is still running.
    if events
        .send(BridgeEvent::ClientDisconnected { client_id })
        .await
        .is_err()
    {
        debug!("session {client_id}: controller already stopped");
    }

    // Abort whichever task is still running.
    writer_task.abort();
    reader_task.abort();

    Ok(())
}

// ── Helper ────────────────────────────────────────────────────────────────────

/// Returns the wire type name for a `ClientMsg` variant.
///
/// Used in debug log messages so request traffic can be followed without
/// logging full payloads.
fn request_type_name(msg: &ClientMsg) -> &'static str {
    match msg {
        ClientMsg::ListPorts => "list-ports",
        ClientMsg::OpenPort { .. } => "open-port",
        ClientMsg::ClosePort => "close-port",
        ClientMsg::SendCommand { .. } => "send-command",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_name_list_ports() {
        assert_eq!(request_type_name(&ClientMsg::ListPorts), "list-ports");
    }

    #[test]
    fn test_request_type_name_open_port() {
        let msg = ClientMsg::OpenPort {
            port: "/dev/ttyUSB0".to_string(),
        };
        assert_eq!(request_type_name(&msg), "open-port");
    }

    #[test]
    fn test_request_type_name_close_port() {
        assert_eq!(request_type_name(&ClientMsg::ClosePort), "close-port");
    }

    #[test]
    fn test_request_type_name_send_command() {
        let msg = ClientMsg::SendCommand {
            channel: "pid.kp".to_string(),
            message: "0.35".to_string(),
        };
        // The name identifies the request without exposing its payload.
        let name = request_type_name(&msg);
        assert_eq!(name, "send-command");
        assert!(!name.contains("0.35"), "type name must not expose field values");
    }
}
