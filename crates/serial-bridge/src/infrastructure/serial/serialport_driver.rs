//! Production [`SerialDriver`] backed by the `serialport` crate.
//!
//! # How a port runs
//!
//! `open` validates the request, spawns a named reader thread, and returns a
//! [`PortConnection`] immediately.  The thread opens the device, reports
//! [`SerialEvent::Opened`], and then alternates between reading device bytes
//! and draining queued commands.  A short read timeout keeps the command
//! drain responsive without busy-waiting.
//!
//! The thread owns line framing: raw reads are accumulated in a buffer and
//! split on the configured terminator, so the rest of the bridge only ever
//! sees complete lines.
//!
//! # Exit paths
//!
//! The reader thread emits [`SerialEvent::Closed`] exactly once, on every
//! way out: an explicit [`PortCommand::Close`], the command channel closing,
//! device EOF (USB unplug), a fatal read error, or the open itself failing.

use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use serialport::{SerialPortInfo, SerialPortType};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::PortDescriptor;
use crate::infrastructure::serial::{
    PortCommand, PortConnection, SerialDriver, SerialError, SerialEvent, SerialOptions,
};

/// Read timeout for the blocking serial read.
///
/// Short enough that queued commands are picked up promptly, long enough
/// that an idle port does not spin.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Size of the per-read buffer.  A full buffer is not a problem; partial
/// lines wait in the accumulator until their terminator arrives.
const READ_CHUNK: usize = 4096;

/// The production serial driver.
///
/// Stateless: all per-port state lives on the reader threads it spawns.
#[derive(Debug, Default)]
pub struct SerialportDriver;

impl SerialportDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SerialDriver for SerialportDriver {
    async fn list_ports(&self) -> Result<Vec<PortDescriptor>, SerialError> {
        // `available_ports` does blocking device/registry walks on every
        // platform, so it runs on the blocking thread pool.
        let ports = tokio::task::spawn_blocking(serialport::available_ports)
            .await
            .map_err(|e| SerialError::Enumerate(e.to_string()))?
            .map_err(|e| SerialError::Enumerate(e.to_string()))?;

        Ok(ports.into_iter().map(descriptor_from_info).collect())
    }

    async fn open(
        &self,
        port_id: String,
        options: SerialOptions,
        events: mpsc::UnboundedSender<SerialEvent>,
    ) -> Result<PortConnection, SerialError> {
        if port_id.trim().is_empty() {
            return Err(SerialError::Open {
                port_id,
                reason: "empty device path".to_string(),
            });
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let thread_port_id = port_id.clone();
        thread::Builder::new()
            .name(format!("serial-{port_id}"))
            .spawn(move || reader_thread(thread_port_id, options, events, command_rx))
            .map_err(|e| SerialError::Open {
                port_id: port_id.clone(),
                reason: format!("failed to spawn reader thread: {e}"),
            })?;

        Ok(PortConnection::new(port_id, command_tx))
    }
}

// ── Reader thread ─────────────────────────────────────────────────────────────

/// Body of the per-device reader thread.
///
/// Send errors on `events` are ignored throughout: they mean the bridge
/// controller is gone, and the loop will notice the closed command channel
/// on its next drain and exit.
fn reader_thread(
    port_id: String,
    options: SerialOptions,
    events: mpsc::UnboundedSender<SerialEvent>,
    mut commands: mpsc::UnboundedReceiver<PortCommand>,
) {
    let mut port = match serialport::new(&port_id, options.baud_rate)
        .timeout(READ_TIMEOUT)
        .open()
    {
        Ok(port) => port,
        Err(e) => {
            warn!(port_id = %port_id, error = %e, "serial open failed");
            let _ = events.send(SerialEvent::Error {
                port_id: port_id.clone(),
                error: format!("open failed: {e}"),
            });
            let _ = events.send(SerialEvent::Closed { port_id });
            return;
        }
    };

    info!(port_id = %port_id, baud_rate = options.baud_rate, "serial port opened");
    let _ = events.send(SerialEvent::Opened {
        port_id: port_id.clone(),
    });

    let terminator = options.line_ending.as_bytes();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        match port.read(&mut buf) {
            // EOF: the device side hung up (typically a USB unplug).
            Ok(0) => {
                debug!(port_id = %port_id, "serial read returned EOF");
                break;
            }
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while let Some(line) = take_line(&mut pending, terminator) {
                    let _ = events.send(SerialEvent::Line {
                        port_id: port_id.clone(),
                        line,
                    });
                }
            }
            // The timeout is how this loop yields to the command drain.
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(port_id = %port_id, error = %e, "serial read failed");
                let _ = events.send(SerialEvent::Error {
                    port_id: port_id.clone(),
                    error: e.to_string(),
                });
                break;
            }
        }

        loop {
            match commands.try_recv() {
                Ok(PortCommand::WriteLine(line)) => {
                    if let Err(e) = write_command(port.as_mut(), &line, terminator) {
                        warn!(port_id = %port_id, error = %e, "serial write failed");
                        let _ = events.send(SerialEvent::Error {
                            port_id: port_id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
                Ok(PortCommand::Close) => {
                    info!(port_id = %port_id, "serial port closed");
                    let _ = events.send(SerialEvent::Closed { port_id });
                    return;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                // The controller dropped the handle; same as an explicit close.
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    info!(port_id = %port_id, "serial port closed (handle dropped)");
                    let _ = events.send(SerialEvent::Closed { port_id });
                    return;
                }
            }
        }
    }

    // Fatal read path: EOF or a non-timeout error broke the outer loop.
    let _ = events.send(SerialEvent::Closed { port_id });
}

/// Writes one command line followed by the terminator, flushing so the
/// device sees it immediately.
fn write_command(
    port: &mut dyn serialport::SerialPort,
    line: &str,
    terminator: &[u8],
) -> io::Result<()> {
    port.write_all(line.as_bytes())?;
    port.write_all(terminator)?;
    port.flush()
}

/// Removes and returns the first complete line from `pending`, or `None`
/// if no terminator has arrived yet.
///
/// Device output is usually UTF-8 but a reset mid-character produces
/// arbitrary bytes, so decoding is lossy rather than fallible.
fn take_line(pending: &mut Vec<u8>, terminator: &[u8]) -> Option<String> {
    let pos = pending
        .windows(terminator.len())
        .position(|window| window == terminator)?;

    let line = String::from_utf8_lossy(&pending[..pos]).into_owned();
    pending.drain(..pos + terminator.len());
    Some(line)
}

/// Maps one enumerated port to its wire descriptor.
fn descriptor_from_info(info: SerialPortInfo) -> PortDescriptor {
    let port_type = match info.port_type {
        SerialPortType::UsbPort(_) => "USB",
        SerialPortType::PciPort => "PCI",
        SerialPortType::BluetoothPort => "Bluetooth",
        SerialPortType::Unknown => "Unknown",
    };
    PortDescriptor {
        port_id: info.port_name,
        port_type: port_type.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line_extracts_single_line() {
        // Arrange
        let mut pending = b"[100|A] hello\nrest".to_vec();

        // Act
        let line = take_line(&mut pending, b"\n");

        // Assert
        assert_eq!(line.as_deref(), Some("[100|A] hello"));
        assert_eq!(pending, b"rest");
    }

    #[test]
    fn test_take_line_extracts_lines_in_order() {
        let mut pending = b"first\nsecond\n".to_vec();

        assert_eq!(take_line(&mut pending, b"\n").as_deref(), Some("first"));
        assert_eq!(take_line(&mut pending, b"\n").as_deref(), Some("second"));
        assert_eq!(take_line(&mut pending, b"\n"), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_take_line_keeps_partial_line() {
        // No terminator yet: the bytes must wait for the next read.
        let mut pending = b"incomplete".to_vec();

        assert_eq!(take_line(&mut pending, b"\n"), None);
        assert_eq!(pending, b"incomplete");
    }

    #[test]
    fn test_take_line_with_crlf_terminator() {
        let mut pending = b"status ok\r\nnext".to_vec();

        let line = take_line(&mut pending, b"\r\n");

        assert_eq!(line.as_deref(), Some("status ok"));
        assert_eq!(pending, b"next");
    }

    #[test]
    fn test_take_line_with_cr_terminator() {
        let mut pending = b"legacy\rtail".to_vec();

        assert_eq!(take_line(&mut pending, b"\r").as_deref(), Some("legacy"));
        assert_eq!(pending, b"tail");
    }

    #[test]
    fn test_take_line_split_across_reads() {
        // Simulates a line arriving in two read chunks.
        let mut pending = b"[100|A] he".to_vec();
        assert_eq!(take_line(&mut pending, b"\n"), None);

        pending.extend_from_slice(b"llo\n");
        assert_eq!(take_line(&mut pending, b"\n").as_deref(), Some("[100|A] hello"));
    }

    #[test]
    fn test_take_line_decodes_invalid_utf8_lossily() {
        // A device reset mid-character must not kill the reader.
        let mut pending = b"ok \xFF\xFE garbage\n".to_vec();

        let line = take_line(&mut pending, b"\n").unwrap();

        assert!(line.starts_with("ok "));
        assert!(line.contains('\u{FFFD}'));
    }

    #[test]
    fn test_take_line_empty_line() {
        let mut pending = b"\nafter".to_vec();
        assert_eq!(take_line(&mut pending, b"\n").as_deref(), Some(""));
        assert_eq!(pending, b"after");
    }

    #[test]
    fn test_descriptor_from_pci_port() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::PciPort,
        };

        let descriptor = descriptor_from_info(info);

        assert_eq!(descriptor.port_id, "/dev/ttyS0");
        assert_eq!(descriptor.port_type, "PCI");
    }

    #[test]
    fn test_descriptor_from_bluetooth_port() {
        let info = SerialPortInfo {
            port_name: "/dev/rfcomm0".to_string(),
            port_type: SerialPortType::BluetoothPort,
        };

        assert_eq!(descriptor_from_info(info).port_type, "Bluetooth");
    }

    #[test]
    fn test_descriptor_from_unknown_port() {
        let info = SerialPortInfo {
            port_name: "COM7".to_string(),
            port_type: SerialPortType::Unknown,
        };

        let descriptor = descriptor_from_info(info);

        assert_eq!(descriptor.port_id, "COM7");
        assert_eq!(descriptor.port_type, "Unknown");
    }

    #[tokio::test]
    async fn test_open_rejects_empty_device_path() {
        // Arrange
        let driver = SerialportDriver::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        // Act
        let result = driver
            .open("  ".to_string(), SerialOptions::default(), events_tx)
            .await;

        // Assert: rejected before any thread is spawned
        match result {
            Err(SerialError::Open { reason, .. }) => {
                assert_eq!(reason, "empty device path");
            }
            other => panic!("expected Open error, got {:?}", other.map(|c| c.port_id().to_string())),
        }
    }

    #[tokio::test]
    async fn test_open_nonexistent_device_reports_error_then_closed() {
        // The open itself succeeds (a thread is spawned); the failure
        // arrives as events from the thread.
        let driver = SerialportDriver::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let conn = driver
            .open(
                "/dev/nonexistent-serial-bridge-test".to_string(),
                SerialOptions::default(),
                events_tx,
            )
            .await
            .unwrap();
        assert_eq!(conn.port_id(), "/dev/nonexistent-serial-bridge-test");

        let first = events_rx.recv().await.unwrap();
        match first {
            SerialEvent::Error { port_id, error } => {
                assert_eq!(port_id, "/dev/nonexistent-serial-bridge-test");
                assert!(error.starts_with("open failed"));
            }
            other => panic!("expected Error event, got {:?}", other),
        }

        let second = events_rx.recv().await.unwrap();
        assert_eq!(
            second,
            SerialEvent::Closed {
                port_id: "/dev/nonexistent-serial-bridge-test".to_string()
            }
        );
    }
}
