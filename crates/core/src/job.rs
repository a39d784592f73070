// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier, kind, state machine and result vocabulary (spec §3, §4.4).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Strictly increasing, process-unique job identifier.
///
/// Unlike the nanoid-style ids used elsewhere in the system, job ids are a
/// plain counter: the spec requires `next_job_id` to be "strictly increasing
/// and never reused" (§3), which a random id cannot demonstrate as cheaply
/// to a reader or a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generator for [`JobId`] values. One per orchestrator instance.
#[derive(Debug, Default)]
pub struct JobIdGen(AtomicU64);

impl JobIdGen {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Allocate the next id. Never returns the same value twice.
    pub fn next(&self) -> JobId {
        JobId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Closed set of job variants (spec §3: "closed variant set, initially
/// `{IsolateAll}`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    IsolateAll,
}

crate::simple_display! {
    JobKind {
        IsolateAll => "isolate_all",
    }
}

/// Job lifecycle state (spec §4.4 state machine table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Waiting,
    Running,
    Finished,
}

crate::simple_display! {
    JobState {
        Waiting => "waiting",
        Running => "running",
        Finished => "finished",
    }
}

impl JobState {
    /// Whether `self -> next` is a transition the state machine allows.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Waiting, JobState::Running) | (JobState::Running, JobState::Finished)
        )
    }
}

/// Terminal outcome of a job (spec §9 "Open question — result string domain").
///
/// The source only ever assigned `Done`; this implementation commits to the
/// full superset as the wire contract, per the spec's recommendation.
/// `rename_all = "lowercase"` keeps `serde`'s rendering the same as
/// [`std::fmt::Display`] below (`"done"`, `"cancelled"`, ...), so the two
/// never drift: whichever one a call site reaches for, the wire token is
/// the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobResult {
    Done,
    Cancelled,
    Failed,
    Timeout,
}

crate::simple_display! {
    JobResult {
        Done => "done",
        Cancelled => "cancelled",
        Failed => "failed",
        Timeout => "timeout",
    }
}

/// Object path for a job, `/org/…/jobs/<id>` (spec §3).
pub fn job_object_path(id: JobId) -> String {
    format!("/org/orch/jobs/{id}")
}
