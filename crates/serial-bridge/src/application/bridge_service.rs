//! BridgeController: the event loop that ties sessions to serial ports.
//!
//! All bridge state (port registry, subscription router, session table)
//! lives inside one controller task.  Everything else in the process talks
//! to it through channels:
//!
//! ```text
//! ws sessions ───BridgeEvent (bounded)───▶ ┌──────────────────┐
//!                                          │ BridgeController │──▶ per-session outbox
//! reader threads ──SerialEvent (unbounded)▶ └──────────────────┘     (bounded, try_send)
//! ```
//!
//! # Why single-task ownership?
//!
//! Because one task owns all the state, handlers run to completion one at a
//! time and no lock is ever taken.  A request handler can read the registry,
//! update the router, and touch the session table without any interleaving;
//! the channels serialise the outside world for it.
//!
//! # Backpressure
//!
//! The inbox is bounded, so a flood of browser requests backpressures the
//! WebSocket reader tasks.  Session outboxes are bounded too; a client that
//! stops reading gets its telemetry dropped ([`try_send`] failure) rather
//! than stalling the controller or ballooning memory.
//!
//! [`try_send`]: tokio::sync::mpsc::Sender::try_send

use std::collections::HashMap;
use std::sync::Arc;

use bridge_core::decode_line;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::{ClientId, PortRegistry, SubscriptionRouter};
use crate::domain::{ClientMsg, ServerMsg};
use crate::infrastructure::serial::{SerialDriver, SerialEvent, SerialOptions};

/// Capacity of the controller inbox.
///
/// Large enough that normal request bursts never block a session task,
/// small enough to backpressure a misbehaving client quickly.
const INBOX_CAPACITY: usize = 256;

/// One connected browser session, as the controller sees it.
#[derive(Debug)]
struct ClientSession {
    /// Channel to the session's WebSocket writer task.
    outbound: mpsc::Sender<ServerMsg>,
    /// The port this client is attached to, `None` when unattached.
    ///
    /// Updated only by [`BridgeController::attach`] and
    /// [`BridgeController::detach`], together with the router, so the
    /// session table and the router can never disagree.
    attached_port: Option<String>,
}

/// Everything that can happen to the bridge, as one enum.
///
/// Session tasks send these into the controller inbox; device events are
/// translated into their `Device*` variants by the controller itself.
#[derive(Debug)]
pub enum BridgeEvent {
    /// A WebSocket session completed its handshake.
    ClientConnected {
        /// Session UUID minted by the session task.
        client_id: ClientId,
        /// Channel to the session's writer task.
        outbound: mpsc::Sender<ServerMsg>,
    },
    /// A session received a parseable protocol message.
    ClientRequest {
        /// Session the request came from.
        client_id: ClientId,
        /// The parsed request.
        request: ClientMsg,
    },
    /// A session ended, for any reason.
    ClientDisconnected {
        /// Session that went away.
        client_id: ClientId,
    },
    /// A device reported its port open.
    DeviceOpened {
        /// Device path that opened.
        port_id: String,
    },
    /// A device produced one complete line.
    DeviceLine {
        /// Device path the line came from.
        port_id: String,
        /// Line content, terminator stripped.
        line: String,
    },
    /// A device's reader thread stopped.
    DeviceClosed {
        /// Device path that closed.
        port_id: String,
    },
    /// Close every port and stop the event loop.
    Shutdown,
}

/// The bridge's single stateful task.
///
/// Create with [`BridgeController::new`], hand the returned sender to the
/// WebSocket server, then `tokio::spawn(controller.run())`.
pub struct BridgeController {
    driver: Arc<dyn SerialDriver>,
    options: SerialOptions,
    registry: PortRegistry,
    router: SubscriptionRouter,
    sessions: HashMap<ClientId, ClientSession>,
    inbox: mpsc::Receiver<BridgeEvent>,
    serial_events: mpsc::UnboundedReceiver<SerialEvent>,
}

impl BridgeController {
    /// Builds a controller over `driver` and returns it together with the
    /// sender for its inbox.
    pub fn new(
        driver: Arc<dyn SerialDriver>,
        options: SerialOptions,
    ) -> (Self, mpsc::Sender<BridgeEvent>) {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (serial_tx, serial_rx) = mpsc::unbounded_channel();

        let registry = PortRegistry::new(Arc::clone(&driver), serial_tx);

        let controller = Self {
            driver,
            options,
            registry,
            router: SubscriptionRouter::new(),
            sessions: HashMap::new(),
            inbox: inbox_rx,
            serial_events: serial_rx,
        };
        (controller, inbox_tx)
    }

    /// Runs the event loop until shutdown.
    ///
    /// The loop ends on a [`BridgeEvent::Shutdown`], or when every inbox
    /// sender has been dropped.  All ports are closed on the way out.
    pub async fn run(mut self) {
        info!("bridge controller started");

        loop {
            tokio::select! {
                event = self.inbox.recv() => match event {
                    Some(BridgeEvent::Shutdown) | None => break,
                    Some(event) => self.handle_event(event).await,
                },
                event = self.serial_events.recv() => match event {
                    Some(event) => self.handle_serial_event(event).await,
                    // Unreachable in practice: the registry holds a sender
                    // for as long as the controller lives.
                    None => break,
                },
            }
        }

        self.registry.close_all();
        info!("bridge controller stopped");
    }

    /// Dispatches one event to its handler.
    pub async fn handle_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::ClientConnected { client_id, outbound } => {
                self.handle_client_connected(client_id, outbound);
            }
            BridgeEvent::ClientRequest { client_id, request } => {
                self.handle_client_request(client_id, request).await;
            }
            BridgeEvent::ClientDisconnected { client_id } => {
                self.handle_client_disconnected(client_id);
            }
            BridgeEvent::DeviceOpened { port_id } => self.handle_device_opened(port_id),
            BridgeEvent::DeviceLine { port_id, line } => self.handle_device_line(port_id, line),
            BridgeEvent::DeviceClosed { port_id } => self.handle_device_closed(port_id),
            BridgeEvent::Shutdown => self.registry.close_all(),
        }
    }

    /// Translates a reader-thread event into its bridge event.
    async fn handle_serial_event(&mut self, event: SerialEvent) {
        match event {
            SerialEvent::Opened { port_id } => {
                self.handle_event(BridgeEvent::DeviceOpened { port_id }).await;
            }
            SerialEvent::Line { port_id, line } => {
                self.handle_event(BridgeEvent::DeviceLine { port_id, line }).await;
            }
            SerialEvent::Closed { port_id } => {
                self.handle_event(BridgeEvent::DeviceClosed { port_id }).await;
            }
            // Device errors are log-only: a fatal one is followed by Closed,
            // and a transient one needs no reaction at all.
            SerialEvent::Error { port_id, error } => {
                warn!(port_id = %port_id, error = %error, "device error");
            }
        }
    }

    // ── Session lifecycle ─────────────────────────────────────────────────────

    fn handle_client_connected(&mut self, client_id: ClientId, outbound: mpsc::Sender<ServerMsg>) {
        self.sessions.insert(
            client_id,
            ClientSession {
                outbound,
                attached_port: None,
            },
        );
        info!(client_id = %client_id, sessions = self.sessions.len(), "client connected");
    }

    fn handle_client_disconnected(&mut self, client_id: ClientId) {
        if let Some(port_id) = self.detach(client_id) {
            debug!(client_id = %client_id, port_id = %port_id, "disconnect released port attachment");
        }
        self.sessions.remove(&client_id);
        info!(client_id = %client_id, sessions = self.sessions.len(), "client disconnected");
    }

    // ── Client requests ───────────────────────────────────────────────────────

    async fn handle_client_request(&mut self, client_id: ClientId, request: ClientMsg) {
        if !self.sessions.contains_key(&client_id) {
            debug!(client_id = %client_id, "request from unknown session ignored");
            return;
        }

        match request {
            ClientMsg::ListPorts => self.handle_list_ports(client_id).await,
            ClientMsg::OpenPort { port } => self.handle_open_port(client_id, port).await,
            ClientMsg::ClosePort => self.handle_close_port(client_id),
            ClientMsg::SendCommand { channel, message } => {
                self.handle_send_command(client_id, channel, message);
            }
        }
    }

    async fn handle_list_ports(&self, client_id: ClientId) {
        let ports = match self.driver.list_ports().await {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "port enumeration failed; replying with empty list");
                Vec::new()
            }
        };
        self.send_to(client_id, ServerMsg::PortList { ports });
    }

    async fn handle_open_port(&mut self, client_id: ClientId, port: String) {
        if let Some(previous) = self.detach(client_id) {
            if previous != port {
                debug!(client_id = %client_id, previous = %previous, "detached from previous port");
            }
        }

        self.registry.open(&port, self.options).await;
        if !self.registry.is_open(&port) {
            // The registry already logged why; the client simply stays
            // unattached and sees no data.
            warn!(client_id = %client_id, port_id = %port, "port did not open; client left unattached");
            return;
        }

        self.attach(client_id, &port);
        info!(client_id = %client_id, port_id = %port, "client attached to port");
    }

    fn handle_close_port(&mut self, client_id: ClientId) {
        let Some(port_id) = self.attached_port_of(client_id) else {
            debug!(client_id = %client_id, "close-port from unattached client ignored");
            return;
        };

        info!(client_id = %client_id, port_id = %port_id, "client requested port close");
        // Detachment and the port-close notification happen when the reader
        // thread confirms with its Closed event, on the same path a device
        // unplug takes.
        self.registry.close(&port_id);
    }

    fn handle_send_command(&self, client_id: ClientId, channel: String, message: String) {
        let Some(port_id) = self.attached_port_of(client_id) else {
            debug!(client_id = %client_id, "send-command from unattached client ignored");
            return;
        };
        let Some(connection) = self.registry.get(&port_id) else {
            debug!(
                client_id = %client_id,
                port_id = %port_id,
                "send-command for unregistered port ignored"
            );
            return;
        };

        debug!(client_id = %client_id, port_id = %port_id, channel = %channel, "forwarding command");
        connection.write_line(format!("{channel} {message}"));
    }

    // ── Device events ─────────────────────────────────────────────────────────

    fn handle_device_opened(&mut self, port_id: String) {
        self.registry.mark_open(&port_id);
        info!(port_id = %port_id, "port open confirmed by device");
    }

    fn handle_device_line(&self, port_id: String, line: String) {
        let watchers = self.router.subscribers_of(&port_id);
        if watchers.is_empty() {
            return;
        }

        let msg = ServerMsg::from(decode_line(&line));
        for client_id in watchers {
            self.send_to(client_id, msg.clone());
        }
    }

    fn handle_device_closed(&mut self, port_id: String) {
        let was_registered = self.registry.deregister(&port_id);
        let detached = self.router.clear_port(&port_id);
        info!(
            port_id = %port_id,
            was_registered,
            watchers = detached.len(),
            "port closed"
        );

        for client_id in detached {
            self.detach(client_id);
            self.send_to(client_id, ServerMsg::PortClose);
        }
    }

    // ── Attachment bookkeeping ────────────────────────────────────────────────

    /// Attaches a client to a port in the router and the session table
    /// together.
    fn attach(&mut self, client_id: ClientId, port_id: &str) {
        self.router.subscribe(client_id, port_id);
        if let Some(session) = self.sessions.get_mut(&client_id) {
            session.attached_port = Some(port_id.to_string());
        }
    }

    /// Detaches a client in the router and the session table together.
    ///
    /// Returns the port it was attached to, if any.
    fn detach(&mut self, client_id: ClientId) -> Option<String> {
        let previous = self.router.unsubscribe(client_id);
        if let Some(session) = self.sessions.get_mut(&client_id) {
            session.attached_port = None;
        }
        previous
    }

    /// The port the client is currently attached to, if any.
    fn attached_port_of(&self, client_id: ClientId) -> Option<String> {
        self.sessions
            .get(&client_id)
            .and_then(|session| session.attached_port.clone())
    }

    /// Delivers one message to one session without ever blocking.
    fn send_to(&self, client_id: ClientId, msg: ServerMsg) {
        let Some(session) = self.sessions.get(&client_id) else {
            debug!(client_id = %client_id, "message for unknown session dropped");
            return;
        };

        match session.outbound.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(client_id = %client_id, "client reading too slowly, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(client_id = %client_id, "client outbox closed, dropping message");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
