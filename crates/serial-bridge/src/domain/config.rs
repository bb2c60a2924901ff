//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from CLI arguments and the config file (preferred
//! for production) or from sensible defaults (useful for local development
//! and tests).
//!
//! # Design rationale
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the bridge easy to embed in tests
//! and future orchestration systems.  The infrastructure layer is responsible
//! for populating the struct from CLI args, environment variables, and the
//! config file.

use std::net::SocketAddr;

use bridge_core::LineEnding;

/// All runtime configuration for the serial WebSocket bridge.
///
/// Build this struct once at startup (via CLI args or defaults) and hand it
/// to the WebSocket server and the bridge controller.
///
/// # Example
///
/// ```rust
/// use serial_bridge::domain::BridgeConfig;
///
/// // Defaults are suitable for local development:
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8765);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The address and port the WebSocket server binds to.
    ///
    /// `0.0.0.0` accepts connections from any network interface (LAN +
    /// localhost).  Set to `127.0.0.1` to accept only local connections for
    /// additional security in production deployments.
    pub ws_bind_addr: SocketAddr,

    /// Baud rate used when opening serial ports.
    ///
    /// Applied to every port the bridge opens; 115200 is what most modern
    /// dev-board firmware is flashed with.
    pub baud_rate: u32,

    /// Line terminator the devices speak.
    ///
    /// Used to split incoming bytes into lines and to terminate outgoing
    /// commands.
    pub line_ending: LineEnding,
}

impl Default for BridgeConfig {
    /// Returns a `BridgeConfig` suitable for local development without any
    /// external configuration.
    ///
    /// | Field        | Default         |
    /// |--------------|-----------------|
    /// | ws_bind_addr | `0.0.0.0:8765`  |
    /// | baud_rate    | 115200          |
    /// | line_ending  | `lf`            |
    fn default() -> Self {
        Self {
            // The `.parse().unwrap()` call here is safe because this is a
            // compile-time-known valid socket address string.
            ws_bind_addr: "0.0.0.0:8765".parse().unwrap(),
            baud_rate: 115_200,
            line_ending: LineEnding::Lf,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
