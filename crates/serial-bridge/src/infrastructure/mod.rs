//! Infrastructure layer for serial-bridge.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from browsers, opening serial ports, and reading the config file.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener for browser WebSocket connections
//! - Performing the WebSocket HTTP upgrade handshake
//! - Enumerating, opening, reading, and writing serial ports
//! - Spawning per-session Tokio tasks and per-device reader threads
//! - Loading the TOML config file from the platform config directory
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Port registry and subscription logic (that is the application layer)
//! - Message type definitions (that is the domain layer)
//! - CLI argument parsing (that is done in `main.rs`)

pub mod serial;
pub mod storage;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use serial::SerialportDriver;
pub use ws_server::run_server;
