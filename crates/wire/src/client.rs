// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public-bus protocol: the orchestrator's external interface and its job
//! objects (spec §4.5, §6).

use orch_core::{JobId, JobResult};
use serde::{Deserialize, Serialize};

/// Well-known object path and interface for the orchestrator itself.
pub const ORCHESTRATOR_OBJECT_PATH: &str = "/org/orch/orchestrator";
pub const ORCHESTRATOR_INTERFACE: &str = "org.orch.Orchestrator";

pub const ISOLATE_ALL_METHOD: &str = "IsolateAll";
pub const JOB_NEW_SIGNAL: &str = "JobNew";
pub const JOB_REMOVED_SIGNAL: &str = "JobRemoved";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IsolateAllRequest {
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IsolateAllReply {
    pub object_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobNewSignal {
    pub id: JobId,
    pub object_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRemovedSignal {
    pub id: JobId,
    pub object_path: String,
    pub result: JobResult,
}

/// Interface published on each per-job object, exposing `JobType` and
/// `State` as read-only properties (spec §4.4, §4.5).
pub const JOB_INTERFACE: &str = "org.orch.Job";
pub const JOB_TYPE_PROPERTY: &str = "JobType";
pub const STATE_PROPERTY: &str = "State";

/// `org.freedesktop.DBus.Properties.Get(interface, property) -> value`,
/// used by clients to read a job's current `JobType`/`State` outside of the
/// change-notification stream.
pub const PROPERTIES_GET_METHOD: &str = "Get";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyGetRequest {
    pub interface: String,
    pub property: String,
}

/// Interface reserved (but empty) on a registered node's published object
/// (spec §4.3: "reserved for future RPC").
pub const NODE_INTERFACE: &str = "org.orch.Node";
