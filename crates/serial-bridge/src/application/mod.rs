//! Application layer for serial-bridge.
//!
//! The application layer orchestrates the business logic: it knows *what* to
//! do, but delegates *how* to do it to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Tracking which serial ports are open (the port registry)
//! - Tracking which client watches which port (the subscription router)
//! - Driving both from one event loop (the bridge controller)
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or serial devices (that is infrastructure, reached
//!   through the `SerialDriver` trait)
//! - WebSocket framing (handled by tokio-tungstenite)
//! - CLI argument parsing (that is done in `main.rs`)

pub mod bridge_service;
pub mod manage_ports;
pub mod subscriptions;

// Re-export so callers can write `application::BridgeController` instead of
// the longer module path.
pub use bridge_service::{BridgeController, BridgeEvent};
pub use manage_ports::{PortRegistry, PortState};
pub use subscriptions::SubscriptionRouter;

/// Identifier for one connected browser session.
pub type ClientId = uuid::Uuid;
