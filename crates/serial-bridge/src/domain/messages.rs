//! JSON message types for the browser-facing WebSocket protocol.
//!
//! Serial devices speak framed text lines; web browsers speak text/JSON
//! naturally.  The bridge exposes the device's line stream as a small JSON
//! protocol so a dashboard needs nothing beyond the browser's built-in
//! `WebSocket` and `JSON.parse`.
//!
//! # Message flow
//!
//! ```text
//! Browser → Bridge:  JSON text frame  →  ClientMsg
//! Bridge  → Browser: DecodedMessage   →  ServerMsg  →  JSON text frame
//! ```
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a `"type"` field that identifies the
//! variant, spelled in kebab-case.  All other fields are flattened into the
//! same object.  For example:
//!
//! ```json
//! {"type":"open-port","port":"/dev/ttyUSB0"}
//! {"type":"port-data","timestamp":12345.0,"channel":"sensors/imu","message":"ax=0.013","raw":"[00012345|sensors/imu      ] ax=0.013"}
//! ```
//!
//! Serde's `#[serde(tag = "type", rename_all = "kebab-case")]` attributes
//! handle this automatically.
//!
//! # Why separate client and server message types?
//!
//! The two directions carry different information:
//!
//! - The browser *sends* requests (list-ports, open-port, send-command, ...)
//! - The bridge *sends* data (port lists, decoded telemetry, close notices)
//!
//! Using two distinct enums makes it a compile-time error to accidentally
//! send a server-only message to the device, and vice versa.

use bridge_core::DecodedMessage;
use serde::{Deserialize, Serialize};

// ── Browser → Bridge messages ─────────────────────────────────────────────────

/// All messages that a browser can send to the bridge over WebSocket.
///
/// # Serde representation
///
/// ```json
/// {"type":"list-ports"}
/// {"type":"open-port","port":"/dev/ttyUSB0"}
/// {"type":"close-port"}
/// {"type":"send-command","channel":"pid.kp","message":"0.35"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
// `tag = "type"` means serde will look for a `"type"` field in the JSON object
// to determine which enum variant to use when deserializing.
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMsg {
    /// Browser asks for the serial ports currently visible on this machine.
    ///
    /// The bridge replies with a [`ServerMsg::PortList`] to this client only.
    ListPorts,

    /// Browser asks to attach to a serial port, opening it if necessary.
    ///
    /// A client is attached to at most one port at a time; opening a second
    /// port silently replaces the first attachment.  The port itself stays
    /// open as long as any client is attached to it.
    OpenPort {
        /// Device path as reported in the port list (e.g. `/dev/ttyUSB0`,
        /// `COM3`).
        port: String,
    },

    /// Browser detaches from its current port.
    ///
    /// The bridge closes the device and notifies every attached client with
    /// a [`ServerMsg::PortClose`].  Sent while not attached, this is a no-op.
    ClosePort,

    /// Browser sends a command line to its attached port.
    ///
    /// The bridge writes `channel`, a space, and `message` to the device,
    /// followed by the configured line terminator.  Sent while not attached,
    /// this is a no-op.
    SendCommand {
        /// Command name understood by the firmware (e.g. `pid.kp`).
        channel: String,
        /// Argument text passed after the command name.
        message: String,
    },
}

// ── Bridge → Browser messages ─────────────────────────────────────────────────

/// All messages that the bridge sends to the browser over WebSocket.
///
/// # Serde representation
///
/// ```json
/// {"type":"port-list","ports":[{"port_id":"/dev/ttyUSB0","port_type":"USB"}]}
/// {"type":"port-data","timestamp":12345.0,"channel":"sensors/imu","message":"ax=0.013","raw":"..."}
/// {"type":"port-close"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMsg {
    /// Reply to [`ClientMsg::ListPorts`]: the ports visible right now.
    ///
    /// Enumeration failure is reported as an empty list, not an error; the
    /// dashboard simply shows no ports until the next refresh.
    PortList {
        /// The enumerated serial ports, possibly empty.
        ports: Vec<PortDescriptor>,
    },

    /// One decoded device line, sent to every client attached to the port.
    PortData {
        /// Device uptime in milliseconds from the line header.
        ///
        /// `None` (JSON `null`) when the line had no header or its timestamp
        /// was unparseable.  JSON has no NaN, so absence stands in for it.
        timestamp: Option<f64>,
        /// Channel path from the header, empty for headerless lines.
        channel: String,
        /// Payload after the header, whitespace-trimmed.
        message: String,
        /// The line exactly as received from the device.
        raw: String,
    },

    /// The client's attached port has closed.
    ///
    /// Sent when any attached client requested the close, or when the device
    /// disappeared (unplugged, I/O error).  After this message the client is
    /// no longer attached to anything.
    PortClose,
}

/// One enumerated serial port in a [`ServerMsg::PortList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// Device path used to open the port (e.g. `/dev/ttyUSB0`, `COM3`).
    pub port_id: String,
    /// Hardware bus the port sits on: `"USB"`, `"PCI"`, `"Bluetooth"`, or
    /// `"Unknown"`.
    pub port_type: String,
}

impl From<DecodedMessage> for ServerMsg {
    /// Converts a decoded device line into its wire representation.
    ///
    /// The decoder uses `NaN` for an absent timestamp; JSON cannot carry NaN,
    /// so it becomes `None` here and `null` on the wire.
    fn from(decoded: DecodedMessage) -> Self {
        ServerMsg::PortData {
            timestamp: if decoded.timestamp.is_nan() {
                None
            } else {
                Some(decoded.timestamp)
            },
            channel: decoded.channel,
            message: decoded.message,
            raw: decoded.raw,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
