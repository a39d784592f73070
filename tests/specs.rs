// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios from spec.md §8, driven entirely over real sockets
//! (TCP for the node protocol, a Unix socket for the public bus) exactly as
//! an external node or client would see them — no access to daemon
//! internals beyond `Config`/`Daemon::start`.

use orch_daemon::{Config, Daemon};
use orch_wire::client::{
    IsolateAllRequest, ISOLATE_ALL_METHOD, ORCHESTRATOR_INTERFACE, ORCHESTRATOR_OBJECT_PATH,
};
use orch_wire::peer::{
    HELLO_METHOD, ISOLATE_METHOD, NODE_PEER_INTERFACE, ORCHESTRATOR_PEER_INTERFACE,
    PEER_OBJECT_PATH, REGISTER_METHOD,
};
use orch_wire::{read_json, write_json, Envelope};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UnixStream};

async fn start_daemon(call_timeout: Duration) -> (Daemon, std::net::SocketAddr, std::path::PathBuf, tempfile::TempDir) {
    let node_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let node_addr = node_listener.local_addr().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let bus_socket = dir.path().join("bus.sock");
    let config = Config {
        listen_addr: node_addr,
        bus_socket: bus_socket.clone(),
        call_timeout,
        timeout_sweep_interval: Duration::from_millis(20),
    };
    let daemon = Daemon::start(node_listener, &bus_socket, &config).await.unwrap();
    (daemon, node_addr, bus_socket, dir)
}

/// A connected, not-yet-registered node socket plus a request serial counter.
struct NodeConn {
    stream: TcpStream,
    serial: u64,
}

impl NodeConn {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self { stream, serial: 1 }
    }

    async fn hello(&mut self) {
        let serial = self.serial;
        self.serial += 1;
        write_json(
            &mut self.stream,
            &Envelope::call(serial, "/org/freedesktop/DBus", "org.freedesktop.DBus", HELLO_METHOD, serde_json::json!({})),
        )
        .await
        .unwrap();
        let reply: Envelope = read_json(&mut self.stream).await.unwrap();
        assert!(matches!(reply, Envelope::MethodReturn { .. }));
    }

    async fn register(&mut self, name: &str) -> Result<String, (String, String)> {
        let serial = self.serial;
        self.serial += 1;
        write_json(
            &mut self.stream,
            &Envelope::call(serial, PEER_OBJECT_PATH, ORCHESTRATOR_PEER_INTERFACE, REGISTER_METHOD, serde_json::json!({"name": name})),
        )
        .await
        .unwrap();
        match read_json(&mut self.stream).await.unwrap() {
            Envelope::MethodReturn { body, .. } => Ok(body["object_path"].as_str().unwrap().to_string()),
            Envelope::Error { name, message, .. } => Err((name, message)),
            other => panic!("unexpected reply to Register: {other:?}"),
        }
    }

    /// Wait for the orchestrator's `Isolate(target)` call and return its
    /// serial and target so the test can reply (or not) on its own schedule.
    async fn recv_isolate(&mut self) -> (u64, String) {
        match read_json(&mut self.stream).await.unwrap() {
            Envelope::MethodCall { serial, object_path, interface, member, body } => {
                assert_eq!(object_path, PEER_OBJECT_PATH);
                assert_eq!(interface, NODE_PEER_INTERFACE);
                assert_eq!(member, ISOLATE_METHOD);
                (serial, body["target"].as_str().unwrap().to_string())
            }
            other => panic!("expected an Isolate call, got {other:?}"),
        }
    }

    async fn ack_isolate(&mut self, serial: u64) {
        write_json(&mut self.stream, &Envelope::reply(serial, serde_json::json!({}))).await.unwrap();
    }
}

struct BusConn {
    stream: UnixStream,
    serial: u64,
}

impl BusConn {
    async fn connect(path: &std::path::Path) -> Self {
        let stream = UnixStream::connect(path).await.unwrap();
        Self { stream, serial: 1 }
    }

    async fn isolate_all(&mut self, target: &str) -> u64 {
        let serial = self.serial;
        self.serial += 1;
        let body = serde_json::to_value(IsolateAllRequest { target: target.to_string() }).unwrap();
        write_json(&mut self.stream, &Envelope::call(serial, ORCHESTRATOR_OBJECT_PATH, ORCHESTRATOR_INTERFACE, ISOLATE_ALL_METHOD, body))
            .await
            .unwrap();
        serial
    }

    async fn recv(&mut self) -> Envelope {
        read_json(&mut self.stream).await.unwrap()
    }
}

fn job_new(env: &Envelope) -> Option<(u64, String)> {
    match env {
        Envelope::Signal { interface, member, body, .. }
            if interface == ORCHESTRATOR_INTERFACE && member == "JobNew" =>
        {
            Some((body["id"].as_u64().unwrap(), body["object_path"].as_str().unwrap().to_string()))
        }
        _ => None,
    }
}

fn job_removed(env: &Envelope) -> Option<(u64, String)> {
    match env {
        Envelope::Signal { interface, member, body, .. }
            if interface == ORCHESTRATOR_INTERFACE && member == "JobRemoved" =>
        {
            Some((body["id"].as_u64().unwrap(), body["result"].as_str().unwrap().to_string()))
        }
        _ => None,
    }
}

fn method_return(env: &Envelope, serial: u64) -> Option<serde_json::Value> {
    match env {
        Envelope::MethodReturn { reply_serial, body } if *reply_serial == serial => Some(body.clone()),
        _ => None,
    }
}

#[tokio::test]
async fn happy_single_node_isolate() {
    let (daemon, node_addr, bus_path, _dir) = start_daemon(Duration::from_secs(5)).await;

    let mut node = NodeConn::connect(node_addr).await;
    node.hello().await;
    node.register("a").await.unwrap();

    let mut client = BusConn::connect(&bus_path).await;
    let call_serial = client.isolate_all("multi-user.target").await;

    let (isolate_serial, target) = node.recv_isolate().await;
    assert_eq!(target, "multi-user.target");
    node.ack_isolate(isolate_serial).await;

    let mut saw_job_new = false;
    let mut saw_reply = None;
    let mut saw_removed = None;
    while saw_removed.is_none() {
        let env = client.recv().await;
        if let Some((id, path)) = job_new(&env) {
            assert_eq!(id, 1);
            assert_eq!(path, "/org/orch/jobs/1");
            saw_job_new = true;
        } else if let Some(body) = method_return(&env, call_serial) {
            saw_reply = Some(body["object_path"].as_str().unwrap().to_string());
        } else if let Some((id, result)) = job_removed(&env) {
            assert_eq!(id, 1);
            assert_eq!(result, "done");
            saw_removed = Some(result);
        }
    }
    assert!(saw_job_new, "JobNew was not observed");
    assert_eq!(saw_reply.as_deref(), Some("/org/orch/jobs/1"));

    daemon.shutdown().await;
}

#[tokio::test]
async fn fan_out_over_three_nodes() {
    let (daemon, node_addr, bus_path, _dir) = start_daemon(Duration::from_secs(5)).await;

    let mut nodes = Vec::new();
    for name in ["a", "b", "c"] {
        let mut node = NodeConn::connect(node_addr).await;
        node.register(name).await.unwrap();
        nodes.push(node);
    }

    let mut client = BusConn::connect(&bus_path).await;
    client.isolate_all("x").await;

    for node in &mut nodes {
        let (serial, target) = node.recv_isolate().await;
        assert_eq!(target, "x");
        node.ack_isolate(serial).await;
    }

    loop {
        if let Some((id, result)) = job_removed(&client.recv().await) {
            assert_eq!(id, 1);
            assert_eq!(result, "done");
            break;
        }
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn serialization_across_two_jobs() {
    let (daemon, node_addr, bus_path, _dir) = start_daemon(Duration::from_secs(5)).await;

    let mut node = NodeConn::connect(node_addr).await;
    node.register("a").await.unwrap();

    let mut client = BusConn::connect(&bus_path).await;
    client.isolate_all("x").await;
    client.isolate_all("y").await;

    let mut job_news = Vec::new();
    while job_news.len() < 2 {
        if let Some((id, _)) = job_new(&client.recv().await) {
            job_news.push(id);
        }
    }
    assert_eq!(job_news, vec![1, 2]);

    // The node must see "x" before "y": the second job cannot start until
    // the first finishes (single-flight, spec §3/§5).
    let (serial, target) = node.recv_isolate().await;
    assert_eq!(target, "x");
    node.ack_isolate(serial).await;

    let mut job_removed_order = Vec::new();
    while job_removed_order.len() < 1 {
        if let Some((id, _)) = job_removed(&client.recv().await) {
            job_removed_order.push(id);
        }
    }
    assert_eq!(job_removed_order, vec![1]);

    let (serial, target) = node.recv_isolate().await;
    assert_eq!(target, "y");
    node.ack_isolate(serial).await;

    loop {
        if let Some((id, _)) = job_removed(&client.recv().await) {
            assert_eq!(id, 2);
            break;
        }
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let (daemon, node_addr, _bus_path, _dir) = start_daemon(Duration::from_secs(5)).await;

    let mut first = NodeConn::connect(node_addr).await;
    first.register("a").await.unwrap();

    let mut second = NodeConn::connect(node_addr).await;
    let err = second.register("a").await.unwrap_err();
    assert_eq!(err.0, "AddressInUse");

    // Both connections remain usable; the second may register under a
    // different name.
    second.register("b").await.unwrap();

    daemon.shutdown().await;
}

#[tokio::test]
async fn disconnect_during_job_times_out_the_missing_reply() {
    let (daemon, node_addr, bus_path, _dir) = start_daemon(Duration::from_millis(150)).await;

    let mut a = NodeConn::connect(node_addr).await;
    a.register("a").await.unwrap();
    let mut b = NodeConn::connect(node_addr).await;
    b.register("b").await.unwrap();

    let mut client = BusConn::connect(&bus_path).await;
    client.isolate_all("x").await;

    let (serial_a, _) = a.recv_isolate().await;
    let (_serial_b, _) = b.recv_isolate().await;

    // b disconnects before replying; a acks normally.
    drop(b);
    a.ack_isolate(serial_a).await;

    loop {
        if let Some((id, result)) = job_removed(&client.recv().await) {
            assert_eq!(id, 1);
            // b's call timed out, so the aggregate is not a clean "done".
            assert_eq!(result, "timeout");
            break;
        }
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn empty_fleet_completes_within_one_turn() {
    let (daemon, _node_addr, bus_path, _dir) = start_daemon(Duration::from_secs(5)).await;

    let mut client = BusConn::connect(&bus_path).await;
    client.isolate_all("x").await;

    let mut saw_new = false;
    loop {
        let env = client.recv().await;
        if job_new(&env).is_some() {
            saw_new = true;
        }
        if let Some((id, result)) = job_removed(&env) {
            assert_eq!(id, 1);
            assert_eq!(result, "done");
            break;
        }
    }
    assert!(saw_new, "JobNew was not observed before JobRemoved");

    daemon.shutdown().await;
}
