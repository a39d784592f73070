// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator facade (spec §4.5, C5): the public bus. Each connected
//! client can call `IsolateAll` and `Properties.Get` on a job object, and
//! receives every `JobNew`/`JobRemoved`/`PropertiesChanged` signal fanned out
//! from the engine's internal [`orch_core::Event`] stream — the "public bus"
//! of spec §6 is modeled as a Unix socket carrying the same framed envelope
//! protocol as the node connections, rather than a session message bus
//! library, per the transport contract in spec §4.2 being an external
//! collaborator this core does not implement.

use crate::engine::{EngineHandle, EngineMsg};
use crate::node_conn::writer_loop;
use orch_core::{job_object_path, JobId};
use orch_core::Event;
use orch_wire::client::{
    IsolateAllRequest, JobNewSignal, JobRemovedSignal, PropertyGetRequest, ISOLATE_ALL_METHOD,
    JOB_INTERFACE, JOB_NEW_SIGNAL, JOB_REMOVED_SIGNAL, ORCHESTRATOR_INTERFACE,
    ORCHESTRATOR_OBJECT_PATH, PROPERTIES_GET_METHOD, STATE_PROPERTY,
};
use orch_wire::{properties_changed, read_json, Envelope, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Accept loop for the public bus's Unix socket.
pub async fn run_listener(listener: UnixListener, engine: EngineHandle, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("public bus listener shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => spawn_connection(stream, engine.clone()),
                    Err(e) => warn!(error = %e, "bus accept failed"),
                }
            }
        }
    }
}

fn spawn_connection(stream: UnixStream, engine: EngineHandle) {
    let (reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Envelope>();
    tokio::spawn(writer_loop(writer, out_rx));
    tokio::spawn(client_loop(reader, out_tx, engine));
}

async fn client_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    out_tx: mpsc::UnboundedSender<Envelope>,
    engine: EngineHandle,
) {
    let mut events = engine.subscribe();
    loop {
        tokio::select! {
            frame = read_json::<_, Envelope>(&mut reader) => {
                match frame {
                    Ok(envelope) => handle_client_frame(envelope, &out_tx, &engine).await,
                    Err(ProtocolError::Closed) => return,
                    Err(e) => {
                        warn!(error = %e, "bus client transport failure");
                        return;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(ev) => {
                        if let Some(signal) = render_signal(&ev) {
                            let _ = out_tx.send(signal);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "bus client fell behind the signal stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

/// Render an internal [`Event`] as the wire signal a bus client observes,
/// or `None` for events that have no client-visible counterpart (node
/// registration/disconnect are logged, not broadcast — spec §4.5 only
/// names `JobNew`/`JobRemoved` as orchestrator signals).
fn render_signal(event: &Event) -> Option<Envelope> {
    match event {
        Event::JobNew { id, object_path } => {
            let signal = JobNewSignal { id: *id, object_path: object_path.clone() };
            Some(Envelope::signal(
                ORCHESTRATOR_OBJECT_PATH,
                ORCHESTRATOR_INTERFACE,
                JOB_NEW_SIGNAL,
                serde_json::to_value(signal).unwrap_or(serde_json::Value::Null),
            ))
        }
        Event::JobRemoved { id, object_path, result } => {
            let signal = JobRemovedSignal { id: *id, object_path: object_path.clone(), result: *result };
            Some(Envelope::signal(
                ORCHESTRATOR_OBJECT_PATH,
                ORCHESTRATOR_INTERFACE,
                JOB_REMOVED_SIGNAL,
                serde_json::to_value(signal).unwrap_or(serde_json::Value::Null),
            ))
        }
        Event::JobStateChanged { object_path, state, .. } => Some(properties_changed(
            object_path.clone(),
            JOB_INTERFACE,
            STATE_PROPERTY,
            serde_json::json!(state.to_string()),
        )),
        Event::NodeRegistered { .. } | Event::NodeDisconnected { .. } => None,
    }
}

async fn handle_client_frame(envelope: Envelope, out_tx: &mpsc::UnboundedSender<Envelope>, engine: &EngineHandle) {
    let Envelope::MethodCall { serial, object_path, member, body, .. } = envelope else {
        debug!("ignoring non-call frame from bus client");
        return;
    };

    if object_path == ORCHESTRATOR_OBJECT_PATH && member == ISOLATE_ALL_METHOD {
        let req: IsolateAllRequest = match serde_json::from_value(body) {
            Ok(r) => r,
            Err(e) => {
                let _ = out_tx.send(Envelope::error(serial, "InvalidArgument", e.to_string()));
                return;
            }
        };
        let (tx, rx) = oneshot::channel();
        engine.send(EngineMsg::IsolateAll { target: req.target, reply: tx });
        match rx.await {
            Ok(Ok(object_path)) => {
                let _ = out_tx.send(Envelope::reply(serial, serde_json::json!({ "object_path": object_path })));
            }
            Ok(Err(err)) => {
                let _ = out_tx.send(Envelope::error(serial, err.wire_code(), err.to_string()));
            }
            Err(_) => {
                let _ = out_tx.send(Envelope::error(serial, "TransportFailure", "engine unavailable"));
            }
        }
        return;
    }

    if member == PROPERTIES_GET_METHOD {
        if let Some(id) = job_id_from_path(&object_path) {
            let req: PropertyGetRequest = match serde_json::from_value(body) {
                Ok(r) => r,
                Err(e) => {
                    let _ = out_tx.send(Envelope::error(serial, "InvalidArgument", e.to_string()));
                    return;
                }
            };
            let (tx, rx) = oneshot::channel();
            engine.send(EngineMsg::GetJobProperty { id, property: req.property, reply: tx });
            match rx.await {
                Ok(Ok(value)) => {
                    let _ = out_tx.send(Envelope::reply(serial, serde_json::json!({ "value": value })));
                }
                Ok(Err(err)) => {
                    let _ = out_tx.send(Envelope::error(serial, err.wire_code(), err.to_string()));
                }
                Err(_) => {
                    let _ = out_tx.send(Envelope::error(serial, "TransportFailure", "engine unavailable"));
                }
            }
            return;
        }
    }

    let _ = out_tx.send(Envelope::error(serial, "InvalidArgument", format!("unknown method {member} on {object_path}")));
}

/// Parse `/org/orch/jobs/<id>` back into a [`JobId`]. Only used to route
/// `Properties.Get`; the canonical path construction is [`job_object_path`].
fn job_id_from_path(object_path: &str) -> Option<JobId> {
    let prefix = job_object_path(JobId(1));
    let prefix = &prefix[..prefix.len() - 1];
    object_path.strip_prefix(prefix)?.parse::<u64>().ok().map(JobId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_from_path_round_trips() {
        assert_eq!(job_id_from_path("/org/orch/jobs/42"), Some(JobId(42)));
        assert_eq!(job_id_from_path("/org/orch/nodes/a"), None);
    }
}
