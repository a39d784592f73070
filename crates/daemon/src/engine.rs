// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reactor-resident orchestrator core (spec §4.4, §5): a single task
//! owning the [`NodeRegistry`] and [`JobQueue`] that drains one [`EngineMsg`]
//! at a time. Every `Node`/`Job` mutation happens here and nowhere else,
//! which is what gives the rest of the daemon the "no locking" invariant of
//! spec §5: node connection tasks and facade connection tasks never touch
//! registry or queue state directly, only send messages to this task.
//!
//! Two deferrals from spec §4.4 — "schedule the next job" and "finish the
//! current job" — are modeled as the engine sending itself an [`EngineMsg`]
//! over its own channel rather than recursing. Because the channel is
//! drained one message per loop iteration, a self-sent message is always
//! processed at the top of the next iteration, exactly the "next reactor
//! turn" semantics the spec calls for.

use crate::job_engine::{IsolateAllState, JobQueue};
use crate::registry::NodeRegistry;
use orch_core::{job_object_path, Event, JobId, JobKind, JobResult, JobState, OrchError};
use orch_wire::peer::{IsolateRequest, NODE_PEER_INTERFACE, PEER_OBJECT_PATH};
use orch_wire::Envelope;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Outcome of one outstanding per-node RPC, as observed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// A `MethodReturn` arrived before the deadline.
    Ack,
    /// An `Error` reply arrived before the deadline.
    Failure,
    /// No reply arrived before `call_timeout` elapsed.
    Timeout,
}

/// Why a node's transport went away, purely for logging (spec SPEC_FULL §3
/// "Structured disconnect reason"); does not change registry semantics.
#[derive(Debug, Clone, Copy)]
pub enum DisconnectReason {
    Eof,
    Io,
}

/// Messages the engine task drains, one at a time, from its own channel.
pub enum EngineMsg {
    /// A node connection was accepted (spec §4.3 accept path).
    NodeAccepted { id: orch_core::ConnectionId, outgoing: UnboundedSender<Envelope> },
    /// The node on `id` called `Register(name)`.
    NodeRegister {
        id: orch_core::ConnectionId,
        name: String,
        reply: oneshot::Sender<Result<String, OrchError>>,
    },
    /// The node on `id` disconnected.
    NodeDisconnected { id: orch_core::ConnectionId, reason: DisconnectReason },
    /// A `MethodReturn`/`Error` arrived correlated to `serial`.
    NodeReply { serial: u64, envelope: Envelope },
    /// A client called `IsolateAll(target)` on the public bus.
    IsolateAll { target: String, reply: oneshot::Sender<Result<String, OrchError>> },
    /// `org.freedesktop.DBus.Properties.Get` on a job object.
    GetJobProperty {
        id: JobId,
        property: String,
        reply: oneshot::Sender<Result<serde_json::Value, OrchError>>,
    },
    /// Deferred: start the next queued job (spec §4.4 scheduler).
    StartNext,
    /// Deferred: finish the current job (spec §4.4 completion).
    FinishCurrent { id: JobId },
    /// `cancel(job)` on the abstract job interface (spec §4.4, §5). A no-op
    /// in v0 for every job kind, kept as a real message rather than omitted
    /// so the abstraction spec §3/§9 describes — three callable behaviors,
    /// `start`/`cancel`/`destroy` — is actually present, not just implied.
    CancelJob { id: JobId },
}

/// A cloneable front door onto the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: UnboundedSender<EngineMsg>,
    events: broadcast::Sender<Event>,
}

impl EngineHandle {
    /// Best-effort send: if the engine task has already shut down this is a
    /// silent no-op, matching "late reply is a no-op" throughout the spec.
    pub fn send(&self, msg: EngineMsg) {
        let _ = self.tx.send(msg);
    }

    /// Subscribe to the engine's internal event stream (spec §4.4/§4.5
    /// signals). Used by the facade to render wire signals and by tests to
    /// assert on lifecycle ordering directly (SPEC_FULL §2 "test tooling").
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

struct PendingCall {
    job_id: JobId,
    deadline: Instant,
}

/// The orchestrator singleton (spec §3 "Orchestrator"), minus the reactor
/// and public-bus connection, which live one layer up in `main`/`facade`.
pub struct Engine {
    registry: NodeRegistry,
    queue: JobQueue,
    pending_calls: HashMap<u64, PendingCall>,
    serials: AtomicU64,
    call_timeout: Duration,
    self_tx: UnboundedSender<EngineMsg>,
    events: broadcast::Sender<Event>,
}

/// Spawn the engine task. Returns a handle for node/facade connections to
/// talk to it and the `JoinHandle` so the caller can await clean shutdown.
pub fn spawn(call_timeout: Duration, sweep_interval: Duration) -> (EngineHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(256);
    let handle = EngineHandle { tx: tx.clone(), events: events.clone() };
    let engine = Engine {
        registry: NodeRegistry::new(),
        queue: JobQueue::new(),
        pending_calls: HashMap::new(),
        serials: AtomicU64::new(1),
        call_timeout,
        self_tx: tx,
        events,
    };
    let join = tokio::spawn(engine.run(rx, sweep_interval));
    (handle, join)
}

impl Engine {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineMsg>, sweep_interval: Duration) {
        let mut sweep = tokio::time::interval(sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => {
                    match msg {
                        Some(msg) => self.handle(msg),
                        None => break,
                    }
                }
                _ = sweep.tick() => self.sweep_timeouts(),
            }
        }
        info!("engine task exiting");
    }

    fn emit(&self, event: Event) {
        debug!(?event, "engine event");
        let _ = self.events.send(event);
    }

    fn next_serial(&self) -> u64 {
        self.serials.fetch_add(1, Ordering::Relaxed)
    }

    fn handle(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::NodeAccepted { id, outgoing } => {
                self.registry.accept(id, outgoing);
            }
            EngineMsg::NodeRegister { id, name, reply } => {
                let result = self.registry.register(&id, name.clone());
                if let Ok(object_path) = &result {
                    info!(name = %name, %object_path, "node registered");
                    self.emit(Event::NodeRegistered { name, object_path: object_path.clone() });
                }
                let _ = reply.send(result);
            }
            EngineMsg::NodeDisconnected { id, reason } => {
                if let Some(name) = self.registry.disconnect(&id) {
                    info!(%name, ?reason, "node disconnected");
                    self.emit(Event::NodeDisconnected { name });
                }
            }
            EngineMsg::NodeReply { serial, envelope } => self.handle_node_reply(serial, envelope),
            EngineMsg::IsolateAll { target, reply } => self.queue_isolate_all(target, reply),
            EngineMsg::GetJobProperty { id, property, reply } => {
                let _ = reply.send(self.get_job_property(id, &property));
            }
            EngineMsg::StartNext => self.start_next(),
            EngineMsg::FinishCurrent { id } => self.finish_current(id),
            EngineMsg::CancelJob { id } => self.cancel_job(id),
        }
    }

    /// `cancel(job)` (spec §4.4 "Abstract job interface"). No external
    /// trigger reaches this in v0 — the facade exposes no `Cancel` method
    /// (spec §4.5) — but the engine still answers the message so the hook
    /// is real, per §5's "the hook exists but is a no-op". Per §9's open
    /// question, a future version would use this to walk `pending_calls`
    /// for `job_id` and abort each one; today it only logs.
    fn cancel_job(&mut self, job_id: JobId) {
        match self.queue.get(job_id).map(|j| j.kind) {
            Some(JobKind::IsolateAll) => {
                debug!(job_id = job_id.0, "cancel requested, no-op in this version");
            }
            None => debug!(job_id = job_id.0, "cancel requested for unknown or already-finished job"),
        }
    }

    fn handle_node_reply(&mut self, serial: u64, envelope: Envelope) {
        let Some(pending) = self.pending_calls.remove(&serial) else {
            warn!(serial, "reply for unknown or already-resolved call serial, ignoring");
            return;
        };
        let outcome = match envelope {
            Envelope::MethodReturn { .. } => CallOutcome::Ack,
            Envelope::Error { .. } => CallOutcome::Failure,
            _ => CallOutcome::Ack,
        };
        self.apply_call_outcome(pending.job_id, outcome);
    }

    fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let expired: Vec<(u64, JobId)> = self
            .pending_calls
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(serial, p)| (*serial, p.job_id))
            .collect();
        for (serial, job_id) in expired {
            self.pending_calls.remove(&serial);
            warn!(job_id = job_id.0, serial, "per-node call timed out");
            self.apply_call_outcome(job_id, CallOutcome::Timeout);
        }
    }

    /// Per §9 "Open question — failure aggregation": any reply, including a
    /// timeout or an error, counts as an acknowledgement for the purposes of
    /// deciding when the job is done; but unlike the C source, the kind of
    /// reply does change the aggregate `JobResult` reported (the corrected
    /// reading SPEC_FULL commits to).
    fn apply_call_outcome(&mut self, job_id: JobId, outcome: CallOutcome) {
        let should_finish = {
            let Some(job) = self.queue.get_mut(job_id) else {
                debug!(job_id = job_id.0, "call outcome for a job no longer in the queue, ignoring");
                return;
            };
            let Some(state) = &mut job.isolate_all else { return };
            match outcome {
                CallOutcome::Ack => {}
                CallOutcome::Failure => state.any_failure = true,
                CallOutcome::Timeout => state.any_timeout = true,
            }
            state.outstanding = state.outstanding.saturating_sub(1);
            state.outstanding == 0
        };
        if should_finish {
            self.finish_job(job_id);
        }
    }

    fn queue_isolate_all(&mut self, target: String, reply: oneshot::Sender<Result<String, OrchError>>) {
        let isolate_all = IsolateAllState { target, outstanding: 0, any_timeout: false, any_failure: false };
        let (id, object_path) = self.queue.enqueue(JobKind::IsolateAll, reply, Some(isolate_all));
        info!(job_id = id.0, %object_path, "job queued");
        self.emit(Event::JobNew { id, object_path: object_path.clone() });

        // spec §4.5: "replies to the caller immediately with the new job's
        // object path" — the reply is consumed here, at enqueue time, not at
        // completion. `reply_to` stays attached to the record afterward only
        // so the source request's lifetime is nominally tied to the job, per
        // §3's "so a reply can be sent if desired in future versions".
        if let Some(job) = self.queue.get_mut(id) {
            if let Some(tx) = job.reply_to.take() {
                let _ = tx.send(Ok(object_path));
            }
        }

        self.maybe_schedule();
    }

    fn get_job_property(&self, id: JobId, property: &str) -> Result<serde_json::Value, OrchError> {
        let job = self
            .queue
            .get(id)
            .ok_or_else(|| OrchError::InvalidArgument(format!("no such job: {}", job_object_path(id))))?;
        match property {
            "JobType" => Ok(serde_json::Value::String(job.kind.to_string())),
            "State" => Ok(serde_json::Value::String(job.state.to_string())),
            other => Err(OrchError::InvalidArgument(format!("unknown property: {other}"))),
        }
    }

    fn maybe_schedule(&mut self) {
        if self.queue.should_schedule() {
            self.queue.mark_scheduling_deferred();
            let _ = self.self_tx.send(EngineMsg::StartNext);
        }
    }

    fn start_next(&mut self) {
        let job = self.queue.promote_head_to_running();
        let id = job.id;
        let object_path = job.object_path.clone();
        let kind = job.kind;
        info!(job_id = id.0, "job started");
        self.emit(Event::JobStateChanged { id, object_path, state: JobState::Running });
        match kind {
            JobKind::IsolateAll => self.start_isolate_all(id),
        }
    }

    fn start_isolate_all(&mut self, job_id: JobId) {
        let target = self
            .queue
            .get(job_id)
            .and_then(|j| j.isolate_all.as_ref())
            .map(|s| s.target.clone())
            .unwrap_or_default();

        let nodes = self.registry.registered_nodes();
        let deadline = Instant::now() + self.call_timeout;
        let mut issued = 0u32;
        for (_name, conn_id) in nodes {
            let Some(outgoing) = self.registry.outgoing_for(&conn_id) else { continue };
            let serial = self.next_serial();
            let body = serde_json::to_value(IsolateRequest { target: target.clone() })
                .unwrap_or(serde_json::Value::Null);
            let call = Envelope::call(serial, PEER_OBJECT_PATH, NODE_PEER_INTERFACE, "Isolate", body);
            if outgoing.send(call).is_ok() {
                self.pending_calls.insert(serial, PendingCall { job_id, deadline });
                issued += 1;
            }
        }

        if let Some(job) = self.queue.get_mut(job_id) {
            if let Some(state) = &mut job.isolate_all {
                state.outstanding = issued;
            }
        }

        debug!(job_id = job_id.0, issued, "isolate_all fanned out");
        if issued == 0 {
            // spec §8 round-trip law: zero nodes completes synchronously.
            self.finish_job(job_id);
        }
    }

    /// A job declares completion (spec §4.4 "Completion"). Asserts
    /// single-flight and defers the actual finish to the next reactor turn.
    fn finish_job(&mut self, job_id: JobId) {
        debug_assert_eq!(self.queue.current_job_id(), Some(job_id), "finish_job called for a non-current job");
        if self.queue.can_defer_finish(job_id) {
            self.queue.mark_finish_deferred();
            let _ = self.self_tx.send(EngineMsg::FinishCurrent { id: job_id });
        }
    }

    fn finish_current(&mut self, id: JobId) {
        let job = self.queue.finish_current();
        debug_assert_eq!(job.id, id);
        let result = job.isolate_all.as_ref().map(IsolateAllState::aggregate_result).unwrap_or(JobResult::Done);
        info!(job_id = job.id.0, %result, "job finished");
        self.emit(Event::JobRemoved { id: job.id, object_path: job.object_path.clone(), result });
        self.maybe_schedule();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::ConnectionId;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn recv_event(rx: &mut broadcast::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn empty_fleet_completes_synchronously() {
        let (handle, _join) = spawn(Duration::from_millis(50), Duration::from_millis(10));
        let mut events = handle.subscribe();
        let (tx, rx) = oneshot::channel();
        handle.send(EngineMsg::IsolateAll { target: "x".into(), reply: tx });

        let path = rx.await.unwrap().unwrap();
        assert_eq!(path, "/org/orch/jobs/1");

        match recv_event(&mut events).await {
            Event::JobNew { id, .. } => assert_eq!(id.0, 1),
            other => panic!("expected JobNew, got {other:?}"),
        }
        match recv_event(&mut events).await {
            Event::JobStateChanged { state, .. } => assert_eq!(state, JobState::Running),
            other => panic!("expected JobStateChanged, got {other:?}"),
        }
        match recv_event(&mut events).await {
            Event::JobRemoved { result, .. } => assert_eq!(result, JobResult::Done),
            other => panic!("expected JobRemoved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_is_a_no_op_in_this_version() {
        let (handle, _join) = spawn(Duration::from_secs(5), Duration::from_millis(10));
        let mut events = handle.subscribe();

        // Cancel on a job that does not exist: must not panic or emit anything.
        handle.send(EngineMsg::CancelJob { id: JobId(99) });

        // A real job proceeds exactly as if cancel had never been sent.
        let (tx, _rx) = oneshot::channel();
        handle.send(EngineMsg::IsolateAll { target: "x".into(), reply: tx });
        let new_ev = recv_event(&mut events).await;
        let Event::JobNew { id, .. } = new_ev else { panic!("expected JobNew, got {new_ev:?}") };
        handle.send(EngineMsg::CancelJob { id });

        assert!(matches!(recv_event(&mut events).await, Event::JobStateChanged { .. }));
        match recv_event(&mut events).await {
            Event::JobRemoved { result, .. } => assert_eq!(result, JobResult::Done),
            other => panic!("expected JobRemoved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fan_out_waits_for_every_node_before_finishing() {
        let (handle, _join) = spawn(Duration::from_millis(200), Duration::from_millis(10));
        let mut events = handle.subscribe();

        let mut conn_ids = Vec::new();
        let mut out_rxs = Vec::new();
        for name in ["a", "b", "c"] {
            let id = ConnectionId::new();
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            handle.send(EngineMsg::NodeAccepted { id: id.clone(), outgoing: out_tx });
            let (reg_tx, reg_rx) = oneshot::channel();
            handle.send(EngineMsg::NodeRegister { id: id.clone(), name: name.into(), reply: reg_tx });
            reg_rx.await.unwrap().unwrap();
            conn_ids.push(id);
            out_rxs.push(out_rx); // kept alive so the engine's `Isolate` sends succeed
        }

        let (tx, rx) = oneshot::channel();
        handle.send(EngineMsg::IsolateAll { target: "x".into(), reply: tx });
        rx.await.unwrap().unwrap();

        assert!(matches!(recv_event(&mut events).await, Event::JobNew { .. }));
        assert!(matches!(recv_event(&mut events).await, Event::JobStateChanged { .. }));

        // Nothing should finish until the timeout sweep fires for all three.
        let too_early = tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
        assert!(too_early.is_err(), "job finished before any node replied");

        match tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap() {
            Event::JobRemoved { result, .. } => assert_eq!(result, JobResult::Timeout),
            other => panic!("expected JobRemoved, got {other:?}"),
        }
    }
}
