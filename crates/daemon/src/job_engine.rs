// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job queue and state machine (spec §3, §4.4).
//!
//! This module owns the data; the actual scheduling turns (when to start,
//! when to finish, what network calls an `IsolateAll` job issues) live in
//! `engine.rs`, which is the only task that ever touches a `JobQueue`.

use orch_core::{job_object_path, JobId, JobIdGen, JobKind, JobResult, JobState};
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// One queued or running job.
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub object_path: String,
    /// Reply channel to the client that issued `IsolateAll` (spec §4.5:
    /// "attaches the incoming request to the job as `source_message`").
    pub reply_to: Option<oneshot::Sender<Result<String, orch_core::OrchError>>>,
    /// `IsolateAll`-specific state. Only ever `Some` for `JobKind::IsolateAll`;
    /// kept inline rather than behind a trait object since there is exactly
    /// one job kind today (spec §9).
    pub isolate_all: Option<IsolateAllState>,
}

pub struct IsolateAllState {
    pub target: String,
    pub outstanding: u32,
    pub any_timeout: bool,
    pub any_failure: bool,
}

impl IsolateAllState {
    /// The result implied by what has been observed so far (spec §9 "Open
    /// question — failure aggregation": this implementation takes the
    /// corrected reading and distinguishes success from failure).
    pub fn aggregate_result(&self) -> JobResult {
        if self.any_timeout {
            JobResult::Timeout
        } else if self.any_failure {
            JobResult::Failed
        } else {
            JobResult::Done
        }
    }
}

/// FIFO, single-flight job queue (spec §3 invariants).
#[derive(Default)]
pub struct JobQueue {
    queue: VecDeque<JobRecord>,
    current: Option<JobId>,
    id_gen: JobIdGen,
    scheduling_deferred: bool,
    finish_deferred: bool,
}

impl JobQueue {
    pub fn new() -> Self {
        Self { id_gen: JobIdGen::new(), ..Default::default() }
    }

    #[cfg(test)]
    pub fn with_id_gen(id_gen: JobIdGen) -> Self {
        Self { id_gen, ..Default::default() }
    }

    /// Allocate a new job in `Waiting` state and append it to the queue.
    /// Returns the new job's id and object path.
    pub fn enqueue(
        &mut self,
        kind: JobKind,
        reply_to: oneshot::Sender<Result<String, orch_core::OrchError>>,
        isolate_all: Option<IsolateAllState>,
    ) -> (JobId, String) {
        let id = self.id_gen.next();
        let object_path = job_object_path(id);
        self.queue.push_back(JobRecord {
            id,
            kind,
            state: JobState::Waiting,
            object_path: object_path.clone(),
            reply_to: Some(reply_to),
            isolate_all,
        });
        (id, object_path)
    }

    /// Whether the scheduler should defer a "start next job" turn right now.
    pub fn should_schedule(&self) -> bool {
        self.current.is_none() && !self.scheduling_deferred && !self.queue.is_empty()
    }

    pub fn mark_scheduling_deferred(&mut self) {
        self.scheduling_deferred = true;
    }

    /// Promote the queue head to `Running` and return a mutable handle to it.
    /// Panics if called when [`Self::should_schedule`] was not recently true
    /// and the deferred fire has now arrived — that would be a scheduler bug.
    #[allow(clippy::expect_used)]
    pub fn promote_head_to_running(&mut self) -> &mut JobRecord {
        self.scheduling_deferred = false;
        debug_assert!(self.current.is_none(), "single-flight invariant violated");
        let job = self.queue.front_mut().expect("scheduler fired with an empty queue");
        job.state = JobState::Running;
        self.current = Some(job.id);
        job
    }

    pub fn current_job_id(&self) -> Option<JobId> {
        self.current
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut JobRecord> {
        self.queue.iter_mut().find(|j| j.id == id)
    }

    pub fn get(&self, id: JobId) -> Option<&JobRecord> {
        self.queue.iter().find(|j| j.id == id)
    }

    /// Whether a finish deferral may be scheduled for the current job.
    pub fn can_defer_finish(&self, id: JobId) -> bool {
        self.current == Some(id) && !self.finish_deferred
    }

    pub fn mark_finish_deferred(&mut self) {
        self.finish_deferred = true;
    }

    /// Finalize the current job: mark `Finished`, remove it from the queue,
    /// clear `current`, and return the removed record for signal emission.
    /// Panics if called with no current job, or if the current job id is not
    /// actually present in the queue — both indicate a scheduler bug, since
    /// `current` and the queue contents are only ever mutated together.
    #[allow(clippy::expect_used)]
    pub fn finish_current(&mut self) -> JobRecord {
        self.finish_deferred = false;
        let id = self.current.take().expect("finish fired with no current job");
        let pos = self.queue.iter().position(|j| j.id == id).expect("current job missing from queue");
        let mut job = self.queue.remove(pos).expect("position just found");
        job.state = JobState::Finished;
        job
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::OrchError;

    fn reply_channel() -> oneshot::Sender<Result<String, OrchError>> {
        oneshot::channel().0
    }

    #[test]
    fn single_flight_invariant_holds_across_enqueue_and_schedule() {
        let mut q = JobQueue::new();
        let (id1, _) = q.enqueue(JobKind::IsolateAll, reply_channel(), None);
        let (id2, _) = q.enqueue(JobKind::IsolateAll, reply_channel(), None);
        assert!(id1.0 < id2.0);
        assert!(q.should_schedule());
        q.mark_scheduling_deferred();
        assert!(!q.should_schedule());

        let job = q.promote_head_to_running();
        assert_eq!(job.id, id1);
        assert_eq!(job.state, JobState::Running);
        assert!(!q.should_schedule(), "a job is running: single-flight");

        let finished = q.finish_current();
        assert_eq!(finished.id, id1);
        assert_eq!(finished.state, JobState::Finished);
        assert_eq!(q.len(), 1, "only the finished job left the queue");
        assert!(q.should_schedule(), "the second job is still waiting");
    }

    #[test]
    fn ids_are_assigned_in_enqueue_order() {
        let mut q = JobQueue::with_id_gen(JobIdGen::starting_at(10));
        let (id, _) = q.enqueue(JobKind::IsolateAll, reply_channel(), None);
        assert_eq!(id.0, 10);
    }
}
