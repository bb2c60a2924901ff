//! Serial port access: the driver trait and its connection handle.
//!
//! # Threading model
//!
//! The `serialport` crate exposes a blocking API, so each open device gets a
//! dedicated OS thread that loops on `read` with a short timeout.  The thread
//! talks to the async world through two channels:
//!
//! ```text
//!                    SerialEvent (unbounded mpsc)
//!   reader thread  ─────────────────────────────▶  bridge controller
//!                  ◀─────────────────────────────
//!                    PortCommand (unbounded mpsc)
//! ```
//!
//! Events flow up (port opened, line received, device error, port closed);
//! commands flow down (write a line, close the port).  Both channels are
//! unbounded because a telemetry burst must never block the reader thread,
//! and the command side only ever carries a handful of messages.
//!
//! # Why a trait?
//!
//! The bridge controller is tested against a mock driver with no hardware.
//! [`SerialDriver`] is the seam: the application layer sees only the trait,
//! and [`SerialportDriver`] is the one production implementation.

use async_trait::async_trait;
use bridge_core::LineEnding;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::PortDescriptor;

pub mod serialport_driver;

pub use serialport_driver::SerialportDriver;

// ── Options and events ────────────────────────────────────────────────────────

/// Settings applied when opening a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialOptions {
    /// Baud rate for the device.
    pub baud_rate: u32,
    /// Line terminator used to frame reads and terminate writes.
    pub line_ending: LineEnding,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            line_ending: LineEnding::Lf,
        }
    }
}

/// Events emitted by a device reader thread.
///
/// Every event names the port it concerns, because all open ports share one
/// event channel into the bridge controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SerialEvent {
    /// The device opened successfully and the reader loop is running.
    Opened {
        /// Device path of the port that opened.
        port_id: String,
    },
    /// One complete line was read from the device, terminator stripped.
    Line {
        /// Device path of the originating port.
        port_id: String,
        /// The line content, without its terminator.
        line: String,
    },
    /// A device I/O problem worth logging.
    ///
    /// Not necessarily fatal; a fatal error is followed by `Closed`.
    Error {
        /// Device path of the originating port.
        port_id: String,
        /// Human-readable error description.
        error: String,
    },
    /// The reader thread has stopped and the device is closed.
    ///
    /// Emitted exactly once per opened port, whether the close was requested,
    /// the device hit EOF (unplugged), or the open itself failed.
    Closed {
        /// Device path of the port that closed.
        port_id: String,
    },
}

/// Commands sent from the bridge controller to a device reader thread.
#[derive(Debug, PartialEq, Eq)]
pub enum PortCommand {
    /// Write this line to the device, followed by the configured terminator.
    WriteLine(String),
    /// Stop the reader loop and close the device.
    Close,
}

// ── Connection handle ─────────────────────────────────────────────────────────

/// Handle to one open serial port.
///
/// Owned by the port registry.  Dropping the handle closes the command
/// channel, which the reader thread treats the same as an explicit
/// [`PortCommand::Close`].
#[derive(Debug)]
pub struct PortConnection {
    port_id: String,
    commands: mpsc::UnboundedSender<PortCommand>,
}

impl PortConnection {
    /// Creates a handle wrapping the command channel of a reader thread.
    pub fn new(port_id: impl Into<String>, commands: mpsc::UnboundedSender<PortCommand>) -> Self {
        Self {
            port_id: port_id.into(),
            commands,
        }
    }

    /// The device path this handle controls.
    pub fn port_id(&self) -> &str {
        &self.port_id
    }

    /// Queues a line for writing to the device.
    ///
    /// If the reader thread has already exited the command is silently
    /// dropped; the controller learns about the close through the
    /// [`SerialEvent::Closed`] event instead.
    pub fn write_line(&self, line: impl Into<String>) {
        if self.commands.send(PortCommand::WriteLine(line.into())).is_err() {
            debug!(port_id = %self.port_id, "write after reader thread exit dropped");
        }
    }

    /// Asks the reader thread to close the device.
    pub fn close(&self) {
        // An error here means the thread is already gone, which is the
        // outcome close wanted anyway.
        let _ = self.commands.send(PortCommand::Close);
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors a [`SerialDriver`] can return directly.
///
/// Most device problems surface as [`SerialEvent`]s instead, because they
/// happen on the reader thread after `open` has already returned.
#[derive(Debug, Error)]
pub enum SerialError {
    /// Port enumeration failed.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),

    /// The open request was rejected before a reader thread was started.
    #[error("failed to open serial port {port_id}: {reason}")]
    Open {
        /// Device path that was requested.
        port_id: String,
        /// Human-readable rejection reason.
        reason: String,
    },
}

// ── Driver trait ──────────────────────────────────────────────────────────────

/// Access to serial hardware, as seen by the application layer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SerialDriver: Send + Sync {
    /// Enumerates the serial ports currently visible on this machine.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Enumerate`] when the platform enumeration call
    /// fails outright.
    async fn list_ports(&self) -> Result<Vec<PortDescriptor>, SerialError>;

    /// Starts opening a serial port.
    ///
    /// Returns as soon as the open is initiated; the outcome arrives on the
    /// `events` channel as [`SerialEvent::Opened`] or, on failure,
    /// [`SerialEvent::Error`] followed by [`SerialEvent::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Open`] only when the request is rejected
    /// without touching the device (invalid path, thread spawn failure).
    async fn open(
        &self,
        port_id: String,
        options: SerialOptions,
        events: mpsc::UnboundedSender<SerialEvent>,
    ) -> Result<PortConnection, SerialError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
