// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node registry (spec §4.3): the set of connected nodes, keyed first by
//! connection id, then by the name each one registers.
//!
//! This is plain, unlocked data — it is only ever touched from inside the
//! single reactor task (see `engine.rs`), which is what lets the rest of
//! the daemon get away without a `Mutex` around job/registry state.

use orch_core::{node_object_path, validate_node_name, ConnectionId, OrchError};
use orch_wire::Envelope;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

struct ConnEntry {
    name: Option<String>,
    outgoing: UnboundedSender<Envelope>,
}

/// Connected nodes, before and after they complete `Register`.
#[derive(Default)]
pub struct NodeRegistry {
    connections: HashMap<ConnectionId, ConnEntry>,
    by_name: HashMap<String, ConnectionId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted connection, unregistered.
    pub fn accept(&mut self, id: ConnectionId, outgoing: UnboundedSender<Envelope>) {
        self.connections.insert(id, ConnEntry { name: None, outgoing });
    }

    /// Apply `Register(name)` (spec §4.3). Returns the node's public object
    /// path on success.
    pub fn register(&mut self, id: &ConnectionId, name: String) -> Result<String, OrchError> {
        validate_node_name(&name)?;
        let entry = self
            .connections
            .get(id)
            .ok_or_else(|| OrchError::TransportFailure("unknown connection".into()))?;
        if entry.name.is_some() {
            return Err(OrchError::AddressInUse(name));
        }
        if self.by_name.contains_key(&name) {
            return Err(OrchError::AddressInUse(name));
        }
        let object_path = node_object_path(&name);
        self.by_name.insert(name.clone(), id.clone());
        // Safe: looked up above.
        if let Some(entry) = self.connections.get_mut(id) {
            entry.name = Some(name);
        }
        Ok(object_path)
    }

    /// Remove a connection on disconnect. Returns its registered name, if any.
    pub fn disconnect(&mut self, id: &ConnectionId) -> Option<String> {
        let entry = self.connections.remove(id)?;
        if let Some(name) = &entry.name {
            self.by_name.remove(name);
        }
        entry.name
    }

    /// `find_node(name)` (spec §4.3): linear scan is fine at fleet scale.
    pub fn find(&self, name: &str) -> Option<&ConnectionId> {
        self.by_name.get(name)
    }

    pub fn outgoing_for(&self, id: &ConnectionId) -> Option<UnboundedSender<Envelope>> {
        self.connections.get(id).map(|e| e.outgoing.clone())
    }

    /// Snapshot of every registered node, for fan-out (spec §4.4 `start`).
    pub fn registered_nodes(&self) -> Vec<(String, ConnectionId)> {
        self.by_name.iter().map(|(name, id)| (name.clone(), id.clone())).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}
