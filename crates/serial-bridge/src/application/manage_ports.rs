//! PortRegistry: open serial port bookkeeping.
//!
//! The `PortRegistry` is the bridge's in-memory record of every serial port
//! it currently holds open.  Each entry tracks:
//!
//! - The [`PortConnection`] handle used to write commands and request close.
//! - The port's [`PortState`].
//!
//! # Port lifecycle (for beginners)
//!
//! Ports progress through these states:
//!
//! ```text
//! (open requested) ──► Opening ──► Open ──► Closing ──► (removed on Closed event)
//! ```
//!
//! - `Opening`: the driver accepted the request; the reader thread is
//!   starting up.  The port is already registered so a second open request
//!   for the same device does not spawn a second reader.
//! - `Open`: the device reported [`SerialEvent::Opened`] and lines are
//!   flowing.
//! - `Closing`: close was requested and the reader thread is winding down.
//!   The entry stays registered until the thread confirms with
//!   [`SerialEvent::Closed`], so an open request racing the close cannot
//!   start a second reader against a device the OS still holds.
//!
//! There is no `Closed` state: a closed port is simply absent from the
//! registry.  The controller removes the entry when the reader thread's
//! `Closed` event arrives, so the registry always mirrors what is actually
//! open on the machine.
//!
//! # Failure policy
//!
//! All operations are lenient.  Opening an already-registered port, marking
//! an unknown port, or closing a port that is unknown or already closing
//! are logged no-ops, because browser requests and device events race and
//! the loser of the race is not an error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::infrastructure::serial::{
    PortConnection, SerialDriver, SerialEvent, SerialOptions,
};

/// Current state of a registered port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Open requested; the reader thread has not reported in yet.
    Opening,
    /// The device is open and producing events.
    Open,
    /// Close requested; the reader thread has not confirmed yet.
    Closing,
}

/// Registry entry for one held-open port.
#[derive(Debug)]
struct RegisteredPort {
    connection: PortConnection,
    state: PortState,
}

/// In-memory registry of all open serial ports.
///
/// Owned exclusively by the bridge controller task, so no locking is
/// needed; everything that touches the registry happens on that one task.
pub struct PortRegistry {
    driver: Arc<dyn SerialDriver>,
    events: mpsc::UnboundedSender<SerialEvent>,
    ports: HashMap<String, RegisteredPort>,
}

impl PortRegistry {
    /// Creates an empty registry that opens ports through `driver` and
    /// points their reader threads at `events`.
    pub fn new(driver: Arc<dyn SerialDriver>, events: mpsc::UnboundedSender<SerialEvent>) -> Self {
        Self {
            driver,
            events,
            ports: HashMap::new(),
        }
    }

    /// Opens a port unless it is already registered.
    ///
    /// On success the port is registered in `Opening` state immediately, so
    /// concurrent open requests for the same device coalesce onto the one
    /// reader thread.  A port mid-close counts as registered: the open
    /// no-ops and the close runs to completion.  A driver rejection is
    /// logged and swallowed; the port simply stays unregistered.
    pub async fn open(&mut self, port_id: &str, options: SerialOptions) {
        if let Some(port) = self.ports.get(port_id) {
            if port.state == PortState::Closing {
                debug!(port_id = %port_id, "open raced an in-flight close; close proceeds");
            } else {
                debug!(port_id = %port_id, "port already open, reusing");
            }
            return;
        }

        match self
            .driver
            .open(port_id.to_string(), options, self.events.clone())
            .await
        {
            Ok(connection) => {
                info!(port_id = %port_id, "port opening");
                self.ports.insert(
                    port_id.to_string(),
                    RegisteredPort {
                        connection,
                        state: PortState::Opening,
                    },
                );
            }
            Err(e) => {
                warn!(port_id = %port_id, error = %e, "port open rejected");
            }
        }
    }

    /// Records that a port's reader thread reported the device open.
    ///
    /// Only an `Opening` port transitions; a late open report cannot
    /// resurrect a port that is already closing.
    pub fn mark_open(&mut self, port_id: &str) {
        match self.ports.get_mut(port_id) {
            Some(port) if port.state == PortState::Opening => port.state = PortState::Open,
            Some(port) => {
                debug!(port_id = %port_id, state = ?port.state, "open report ignored in current state");
            }
            None => debug!(port_id = %port_id, "open report arrived after deregistration"),
        }
    }

    /// Requests close of a registered port and marks it `Closing`.
    ///
    /// The entry stays registered until the reader thread confirms with a
    /// [`SerialEvent::Closed`] event and the controller deregisters it, so
    /// an open request for the same id inside that window cannot start a
    /// second reader thread while the device is still held.
    pub fn close(&mut self, port_id: &str) {
        match self.ports.get_mut(port_id) {
            Some(port) if port.state == PortState::Closing => {
                debug!(port_id = %port_id, "close already in flight");
            }
            Some(port) => {
                info!(port_id = %port_id, "port close requested");
                port.state = PortState::Closing;
                port.connection.close();
            }
            None => debug!(port_id = %port_id, "close of unregistered port ignored"),
        }
    }

    /// Removes a port entry without sending a close command.
    ///
    /// Used when the reader thread has stopped, whether on its own (device
    /// unplug, fatal read error) or in response to [`close`](Self::close).
    /// Returns whether the port was registered.
    pub fn deregister(&mut self, port_id: &str) -> bool {
        self.ports.remove(port_id).is_some()
    }

    /// Whether the port is currently registered (opening, open, or closing).
    pub fn is_open(&self, port_id: &str) -> bool {
        self.ports.contains_key(port_id)
    }

    /// The connection handle for a registered port.
    pub fn get(&self, port_id: &str) -> Option<&PortConnection> {
        self.ports.get(port_id).map(|port| &port.connection)
    }

    /// The state of a registered port.
    pub fn state(&self, port_id: &str) -> Option<PortState> {
        self.ports.get(port_id).map(|port| port.state)
    }

    /// Closes every registered port.  Used at shutdown.
    pub fn close_all(&mut self) {
        for (port_id, port) in self.ports.drain() {
            info!(port_id = %port_id, "closing port at shutdown");
            port.connection.close();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
