//! serial-bridge library crate.
//!
//! This crate provides a WebSocket bridge that streams serial device
//! telemetry to browser dashboards and relays their commands back.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (JSON over WebSocket)
//!         ↕
//! [serial-bridge]
//!   ├── domain/           Pure types: JSON message enums, BridgeConfig
//!   ├── application/      Bridge logic: port registry, subscriptions, controller
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         ├── serial/     Serial port access (serialport, one thread per device)
//!         └── storage/    Config file loading (TOML)
//!         ↕
//! Serial devices (/dev/ttyUSB0, COM3, ...)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies beyond serde (no I/O, no async).
//! - `application` depends on `domain` and `bridge-core`, and reaches hardware
//!   only through the `SerialDriver` trait.
//! - `infrastructure` depends on all other layers plus `tokio`, `tungstenite`,
//!   and `serialport`.
//!
//! # For beginners: why this structure?
//!
//! Clean architecture separates *what the program does* (domain + application)
//! from *how it does it* (infrastructure).  The bridge logic is tested against
//! a mock driver with no real hardware, and the serial backend could be swapped
//! (e.g., for a TCP-attached device server) without touching the routing logic.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: port registry, subscription routing, bridge controller.
pub mod application;

/// Infrastructure layer: WebSocket server, serial port driver, config storage.
pub mod infrastructure;
