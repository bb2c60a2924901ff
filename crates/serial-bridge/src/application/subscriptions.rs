//! SubscriptionRouter: which client watches which port.
//!
//! The router is a pure bookkeeping structure with one invariant at its
//! heart: **a client is attached to at most one port at a time**.  Opening a
//! second port implicitly detaches from the first, mirroring how a dashboard
//! tab shows one device.
//!
//! Both directions of the relationship are indexed:
//!
//! ```text
//! subscribers:  port_id  ──► {client, client, ...}   (fan-out on device lines)
//! attachments:  client   ──► port_id                 (lookup on client requests)
//! ```
//!
//! Every mutation updates both maps together, so they can never disagree.
//! Empty subscriber sets are pruned immediately; a port key present in
//! `subscribers` always has at least one watcher.
//!
//! # No I/O here
//!
//! The router never talks to devices or sockets.  The bridge controller
//! reads its answers (who subscribes to this port? which port is this
//! client on?) and performs the actual sends.

use std::collections::{HashMap, HashSet};

use crate::application::ClientId;

/// Two-way index of client-to-port attachments.
#[derive(Debug, Default)]
pub struct SubscriptionRouter {
    subscribers: HashMap<String, HashSet<ClientId>>,
    attachments: HashMap<ClientId, String>,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a client to a port, detaching it from any previous port.
    ///
    /// Returns the port the client was attached to before, if any.
    pub fn subscribe(&mut self, client_id: ClientId, port_id: &str) -> Option<String> {
        let previous = self.unsubscribe(client_id);

        self.subscribers
            .entry(port_id.to_string())
            .or_default()
            .insert(client_id);
        self.attachments.insert(client_id, port_id.to_string());

        previous
    }

    /// Detaches a client from its port, if it is attached to one.
    ///
    /// Returns the port it was detached from.
    pub fn unsubscribe(&mut self, client_id: ClientId) -> Option<String> {
        let port_id = self.attachments.remove(&client_id)?;

        if let Some(watchers) = self.subscribers.get_mut(&port_id) {
            watchers.remove(&client_id);
            if watchers.is_empty() {
                self.subscribers.remove(&port_id);
            }
        }

        Some(port_id)
    }

    /// Snapshot of the clients attached to a port.
    ///
    /// Empty for a port nobody watches.  A snapshot rather than a borrow so
    /// the caller can mutate sessions while iterating.
    pub fn subscribers_of(&self, port_id: &str) -> Vec<ClientId> {
        self.subscribers
            .get(port_id)
            .map(|watchers| watchers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Detaches every client from a port at once.
    ///
    /// Used when the port closes underneath them.  Returns the clients that
    /// were attached, so the caller can notify each one.
    pub fn clear_port(&mut self, port_id: &str) -> Vec<ClientId> {
        let Some(watchers) = self.subscribers.remove(port_id) else {
            return Vec::new();
        };

        for client_id in &watchers {
            self.attachments.remove(client_id);
        }
        watchers.into_iter().collect()
    }

    /// The port a client is currently attached to.
    pub fn attached_port(&self, client_id: ClientId) -> Option<&str> {
        self.attachments.get(&client_id).map(String::as_str)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
