// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node connection manager (spec §4.3, C3): accepts peer sockets, drives the
//! handshake/`Register` protocol, and forwards outgoing `Isolate` calls.
//!
//! Each accepted connection gets two tasks — a reader and a writer — plus an
//! `mpsc` channel the engine uses to push outgoing frames. Neither task
//! touches [`crate::registry::NodeRegistry`] or [`crate::job_engine::JobQueue`]
//! directly; they only exchange [`EngineMsg`] with the single engine task,
//! preserving the no-locking invariant of spec §5.

use crate::engine::{DisconnectReason, EngineHandle, EngineMsg};
use orch_core::ConnectionId;
use orch_wire::peer::{
    HelloReply, RegisterRequest, DBUS_INTERFACE, DBUS_OBJECT_PATH, HELLO_METHOD,
    ORCHESTRATOR_PEER_INTERFACE, PEER_OBJECT_PATH, REGISTER_METHOD,
};
use orch_wire::{read_json, write_json, Envelope, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Accept loop for the node listener (spec §6: TCP, `INADDR_ANY`, port 1999).
/// One connection accepted per reactor tick; non-blocking by virtue of being
/// an async `accept().await` inside the loop, matching spec §4.3's "accept
/// one connection per reactor tick" without needing to poll manually.
pub async fn run_listener(listener: TcpListener, engine: EngineHandle, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("node listener shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let _ = stream.set_nodelay(true);
                        spawn_connection(stream, addr, engine.clone());
                    }
                    Err(e) => warn!(error = %e, "node accept failed"),
                }
            }
        }
    }
}

fn spawn_connection(stream: TcpStream, addr: std::net::SocketAddr, engine: EngineHandle) {
    let id = ConnectionId::new();
    let (reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Envelope>();

    engine.send(EngineMsg::NodeAccepted { id: id.clone(), outgoing: out_tx.clone() });
    info!(conn = %id, %addr, "node connection accepted");

    tokio::spawn(writer_loop(writer, out_rx));
    tokio::spawn(reader_loop(reader, id, out_tx, engine));
}

pub(crate) async fn writer_loop<W: AsyncWrite + Unpin>(mut writer: W, mut rx: UnboundedReceiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        if let Err(e) = write_json(&mut writer, &envelope).await {
            warn!(error = %e, "node write failed, closing connection");
            break;
        }
    }
}

async fn reader_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    id: ConnectionId,
    out_tx: UnboundedSender<Envelope>,
    engine: EngineHandle,
) {
    loop {
        let envelope: Envelope = match read_json(&mut reader).await {
            Ok(e) => e,
            Err(ProtocolError::Closed) => {
                engine.send(EngineMsg::NodeDisconnected { id, reason: DisconnectReason::Eof });
                return;
            }
            Err(e) => {
                warn!(conn = %id, error = %e, "node transport failure");
                engine.send(EngineMsg::NodeDisconnected { id, reason: DisconnectReason::Io });
                return;
            }
        };

        match envelope {
            Envelope::MethodCall { serial, object_path, interface, member, body } => {
                handle_call(&id, serial, &object_path, &interface, &member, body, &out_tx, &engine)
                    .await;
            }
            Envelope::MethodReturn { reply_serial, body } => {
                engine.send(EngineMsg::NodeReply {
                    serial: reply_serial,
                    envelope: Envelope::MethodReturn { reply_serial, body },
                });
            }
            Envelope::Error { reply_serial, name, message } => {
                engine.send(EngineMsg::NodeReply {
                    serial: reply_serial,
                    envelope: Envelope::Error { reply_serial, name, message },
                });
            }
            Envelope::Signal { member, .. } => {
                debug!(conn = %id, %member, "ignoring unexpected signal from node");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_call(
    id: &ConnectionId,
    serial: u64,
    object_path: &str,
    interface: &str,
    member: &str,
    body: serde_json::Value,
    out_tx: &UnboundedSender<Envelope>,
    engine: &EngineHandle,
) {
    if object_path == DBUS_OBJECT_PATH && interface == DBUS_INTERFACE && member == HELLO_METHOD {
        let reply = HelloReply::default();
        let _ = out_tx.send(Envelope::reply(serial, serde_json::json!({ "unique_name": reply.unique_name })));
        return;
    }

    if object_path == PEER_OBJECT_PATH && interface == ORCHESTRATOR_PEER_INTERFACE && member == REGISTER_METHOD {
        let req: RegisterRequest = match serde_json::from_value(body) {
            Ok(r) => r,
            Err(e) => {
                let _ = out_tx.send(Envelope::error(serial, "InvalidArgument", e.to_string()));
                return;
            }
        };
        let (tx, rx) = oneshot::channel();
        engine.send(EngineMsg::NodeRegister { id: id.clone(), name: req.name, reply: tx });
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

    let _ = out_tx.send(Envelope::error(
        serial,
        "InvalidArgument",
        format!("unknown method {member} on {object_path} ({interface})"),
    ));
}
