// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node (peer) protocol: the object/interface/method surface exposed over
//! each accepted direct connection (spec §4.3, §6).

use serde::{Deserialize, Serialize};

/// `/org/freedesktop/DBus`, satisfying the peer's initial handshake.
pub const DBUS_OBJECT_PATH: &str = "/org/freedesktop/DBus";
pub const DBUS_INTERFACE: &str = "org.freedesktop.DBus";
pub const HELLO_METHOD: &str = "Hello";
/// The constant unique name every accepted peer is told it has (spec §4.3).
pub const STUB_UNIQUE_NAME: &str = ":1.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HelloReply {
    pub unique_name: String,
}

impl Default for HelloReply {
    fn default() -> Self {
        Self { unique_name: STUB_UNIQUE_NAME.to_string() }
    }
}

/// `/org/orch/peer`, interface `org.orch.Orchestrator.Peer`, method `Register`.
pub const PEER_OBJECT_PATH: &str = "/org/orch/peer";
pub const ORCHESTRATOR_PEER_INTERFACE: &str = "org.orch.Orchestrator.Peer";
pub const REGISTER_METHOD: &str = "Register";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterRequest {
    pub name: String,
}

/// Interface exposed on the node's own peer object path once registered,
/// used for the outgoing `Isolate` call (spec §4.4, §6).
pub const NODE_PEER_INTERFACE: &str = "org.orch.Node.Peer";
pub const ISOLATE_METHOD: &str = "Isolate";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IsolateRequest {
    pub target: String,
}
