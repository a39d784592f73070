// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signals the orchestrator emits, both over the wire and for internal
//! observability/testing (spec §4.4, §4.5, §8).
//!
//! These are distinct from the wire-level `Signal` frames in `orch-wire`:
//! this `Event` is the engine's internal notion of "something happened",
//! which the facade then renders onto the public-bus connection as a wire
//! signal. Keeping the two separate lets job-engine tests assert on `Event`
//! values without going through a socket.

use crate::job::{JobId, JobResult, JobState};
use serde::{Deserialize, Serialize};

/// Something the orchestrator wants observers to know about.
///
/// Serializes with `{"type": "event:name", ...fields}`, matching the
/// tagged-enum convention used for wire messages in this workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A job was queued. Emitted exactly once per job, before any other
    /// signal naming that job (spec invariant 4).
    #[serde(rename = "job:new")]
    JobNew { id: JobId, object_path: String },

    /// A job's `State` property changed. Emitted exactly once per real
    /// transition (spec invariant 5).
    #[serde(rename = "job:state-changed")]
    JobStateChanged { id: JobId, object_path: String, state: JobState },

    /// A job finished and was popped from the queue. Emitted exactly once
    /// per job, after `JobNew` (spec invariant 4).
    #[serde(rename = "job:removed")]
    JobRemoved { id: JobId, object_path: String, result: JobResult },

    /// A node completed `Register` successfully.
    #[serde(rename = "node:registered")]
    NodeRegistered { name: String, object_path: String },

    /// A node's transport disconnected and it was dropped from the registry.
    #[serde(rename = "node:disconnected")]
    NodeDisconnected { name: String },
}

impl Event {
    /// Job id this event concerns, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Event::JobNew { id, .. }
            | Event::JobStateChanged { id, .. }
            | Event::JobRemoved { id, .. } => Some(*id),
            Event::NodeRegistered { .. } | Event::NodeDisconnected { .. } => None,
        }
    }
}
