//! bridge-core: shared telemetry types for the serial WebSocket bridge.
//!
//! This crate holds the pure, I/O-free pieces the bridge daemon and its tests
//! build on:
//!
//! - [`telemetry::decode`]: parsing of `[timestamp|channel]` headers printed
//!   by device firmware.
//! - [`telemetry::line_ending`]: the line terminator vocabulary shared by the
//!   configuration file, the CLI, and the serial reader.
//!
//! Nothing in this crate touches a serial port, a socket, or the file system,
//! so every function here can be tested and benchmarked in isolation.

pub mod telemetry;

// Re-export the most commonly used types at the crate root so dependants can
// write `bridge_core::decode_line` instead of the full module path.
pub use telemetry::decode::{decode_line, DecodedMessage};
pub use telemetry::line_ending::LineEnding;
