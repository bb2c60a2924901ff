//! Serial telemetry WebSocket bridge — entry point.
//!
//! This binary accepts WebSocket connections from web browsers and bridges
//! them to local serial devices.  It acts as a thin translation layer between
//! the JSON-over-WebSocket browser protocol and raw line-oriented serial
//! traffic.
//!
//! # Why a separate bridge process?
//!
//! Web browsers cannot open serial devices directly (the Web Serial API is
//! Chromium-only and requires a user gesture per session).  This bridge opens
//! the devices on the host and exposes them over WebSocket so any browser
//! dashboard can:
//!
//! - List and open serial ports by name.
//! - Receive decoded telemetry lines as JSON events.
//! - Send command strings back to the device.
//!
//! # Usage
//!
//! ```text
//! serial-bridge [OPTIONS]
//!
//! Options:
//!   --bind        <ADDR>  IP address to bind the WebSocket listener to
//!   --port        <PORT>  TCP port for the WebSocket listener
//!   --baud-rate   <BAUD>  Baud rate for opened serial devices
//!   --line-ending <NAME>  Device line terminator: lf, cr, or crlf
//!   --config      <PATH>  Explicit config file path
//! ```
//!
//! # Environment variable overrides
//!
//! Every CLI flag can also be supplied as an environment variable.  CLI args
//! take precedence when both are present.
//!
//! | Variable                    | Description                          |
//! |-----------------------------|--------------------------------------|
//! | `SERIAL_BRIDGE_BIND`        | WebSocket bind address               |
//! | `SERIAL_BRIDGE_PORT`        | WebSocket listener port              |
//! | `SERIAL_BRIDGE_BAUD`        | Serial device baud rate              |
//! | `SERIAL_BRIDGE_LINE_ENDING` | Device line terminator               |
//! | `SERIAL_BRIDGE_CONFIG`      | Explicit config file path            |
//!
//! # Configuration precedence
//!
//! Settings are resolved in this order (highest wins):
//!
//! 1. CLI flags
//! 2. Environment variables
//! 3. The TOML config file (see `infrastructure::storage::config`)
//! 4. Built-in defaults (`0.0.0.0:8765`, 115200 baud, LF)
//!
//! # Architecture overview
//!
//! ```text
//! Web Browser  (JSON over WebSocket)
//!       ↕
//! serial-bridge  ← this process
//!   domain/         JSON message types, BridgeConfig
//!   application/    Port registry, subscription router, event loop
//!   infrastructure/
//!     ws_server/    Accept WebSocket connections
//!     serial/       Per-device reader threads
//!       ↕
//! Serial devices  (USB CDC-ACM, UART adapters, ...)
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bridge_core::LineEnding;
use serial_bridge::application::{BridgeController, BridgeEvent};
use serial_bridge::domain::BridgeConfig;
use serial_bridge::infrastructure::serial::{SerialDriver, SerialOptions};
use serial_bridge::infrastructure::storage::config::{load_config, load_config_from, ConfigError};
use serial_bridge::infrastructure::{run_server, SerialportDriver};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial telemetry WebSocket bridge.
///
/// Accepts WebSocket connections from browsers and bridges them to local
/// serial devices.
///
/// Every field is an `Option` so that an unset flag falls through to the
/// config file value rather than clobbering it with a hard-coded default.
#[derive(Debug, Parser)]
#[command(
    name = "serial-bridge",
    about = "WebSocket bridge exposing local serial devices to browsers",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept connections from any network interface (LAN +
    /// localhost), or `127.0.0.1` to accept only local connections.
    #[arg(long, env = "SERIAL_BRIDGE_BIND")]
    bind: Option<String>,

    /// TCP port for the WebSocket server to listen on.
    ///
    /// Browsers connect to this port via WebSocket (ws://host:PORT).
    #[arg(long, env = "SERIAL_BRIDGE_PORT")]
    port: Option<u16>,

    /// Baud rate applied to every serial device the bridge opens.
    #[arg(long, env = "SERIAL_BRIDGE_BAUD")]
    baud_rate: Option<u32>,

    /// Line terminator the serial devices speak: `lf`, `cr`, or `crlf`.
    ///
    /// Used both to split the incoming byte stream into lines and to
    /// terminate outgoing command strings.
    #[arg(long, env = "SERIAL_BRIDGE_LINE_ENDING")]
    line_ending: Option<LineEnding>,

    /// Explicit config file path.
    ///
    /// When absent, the platform default location is used (e.g.
    /// `~/.config/serial-bridge/config.toml` on Linux).
    #[arg(long, env = "SERIAL_BRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Merges the parsed CLI arguments with the config file into a
    /// [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given config file cannot be read or
    /// parsed, or if the resulting bind address string is invalid.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        // Load the file layer first; CLI values override it field by field.
        let file = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => match load_config() {
                Ok(cfg) => cfg,
                // No resolvable platform config dir (stripped container,
                // unusual OS) just means defaults.
                Err(ConfigError::NoPlatformConfigDir) => Default::default(),
                Err(e) => return Err(e).context("failed to load config file"),
            },
        };

        let bind = self.bind.unwrap_or(file.server.bind_address);
        let port = self.port.unwrap_or(file.server.port);
        let ws_bind_addr = format!("{bind}:{port}")
            .parse()
            .with_context(|| format!("invalid WebSocket bind address: '{bind}:{port}'"))?;

        Ok(BridgeConfig {
            ws_bind_addr,
            baud_rate: self.baud_rate.unwrap_or(file.serial.baud_rate),
            line_ending: self.line_ending.unwrap_or(file.serial.line_ending),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// The `#[tokio::main]` attribute sets up the Tokio multi-threaded async
/// runtime.  All async tasks (WebSocket sessions, the bridge controller) run
/// on this runtime's thread pool; serial I/O runs on dedicated blocking
/// threads managed by the serial driver.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised to format log output.  The log
///    level is controlled by the `RUST_LOG` environment variable (e.g.,
///    `RUST_LOG=debug`).
/// 2. CLI arguments are parsed with `clap` and merged with the config file
///    into a [`BridgeConfig`].
/// 3. A Ctrl+C handler is spawned; it sets a shared `AtomicBool` to `false`
///    when the user presses Ctrl+C.
/// 4. The [`BridgeController`] task is spawned; it owns all port and
///    subscription state and processes events one at a time.
/// 5. [`run_server`] is called, which binds the WebSocket port and accepts
///    browser connections until the shutdown flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `EnvFilter::try_from_default_env()` reads the `RUST_LOG` environment
    // variable.  If it is absent or invalid, we fall back to `info` level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    //
    // `Cli::parse()` reads from `std::env::args()` and exits with a usage
    // message if a value is invalid.
    let cli = Cli::parse();

    // Merge CLI arguments with the config file into a BridgeConfig.
    let config = cli.into_bridge_config()?;

    info!(
        "serial bridge starting — ws={}, baud={}, line-ending={}",
        config.ws_bind_addr, config.baud_rate, config.line_ending
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    //
    // `AtomicBool` is a thread-safe boolean that can be read and written from
    // multiple threads without a Mutex.  We use `Relaxed` ordering because we
    // only need the value to eventually propagate — precise ordering is not
    // required here.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    // Spawn a task that listens for Ctrl+C (SIGINT on Unix).
    // When received, it sets `running` to false.  The accept loop in
    // `run_server` checks this flag every 200 ms and exits cleanly.
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Bridge controller task ─────────────────────────────────────────────────
    //
    // The controller owns all port and subscription state.  WebSocket sessions
    // talk to it exclusively through the event channel returned here.
    let driver: Arc<dyn SerialDriver> = Arc::new(SerialportDriver::new());
    let options = SerialOptions {
        baud_rate: config.baud_rate,
        line_ending: config.line_ending,
    };
    let (controller, events) = BridgeController::new(driver, options);
    let controller_task = tokio::spawn(controller.run());

    // ── Main server loop ───────────────────────────────────────────────────────
    run_server(config, running, events.clone()).await?;

    // The accept loop has exited; tell the controller to close all devices.
    if events.send(BridgeEvent::Shutdown).await.is_err() {
        warn!("bridge controller already stopped before shutdown event");
    }
    if let Err(e) = controller_task.await {
        warn!("bridge controller task ended abnormally: {e}");
    }

    info!("serial bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
