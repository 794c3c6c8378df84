//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use broker_bridge::broker::{
    AckCallback, BrokerConnection, BrokerError, ConnectionGate, ConnectionState, OutboundMessage,
    ReceiptId,
};
use broker_bridge::config::RestConfig;
use broker_bridge::correlation::CorrelationEngine;
use broker_bridge::http::BridgeServer;

/// How the in-memory broker answers a send.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Acknowledge right away with the message's receipt.
    Ack,
    /// Accept the message and never acknowledge it.
    Silent,
    /// Refuse the send.
    Refuse(BrokerError),
}

/// In-memory broker recording every message it is handed.
pub struct MemoryBroker {
    gate: ConnectionGate,
    reply: Mutex<Reply>,
    sent: Mutex<Vec<OutboundMessage>>,
    held: Mutex<Vec<(ReceiptId, AckCallback)>>,
}

impl MemoryBroker {
    pub fn new(gate: ConnectionGate, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            gate,
            reply: Mutex::new(reply),
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    /// Broker whose gate is already Connected.
    pub fn connected(reply: Reply) -> Arc<Self> {
        let gate = ConnectionGate::new();
        gate.transition(ConnectionState::Connected);
        Self::new(gate, reply)
    }

    pub fn gate(&self) -> ConnectionGate {
        self.gate.clone()
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Acknowledgments still held for senders that are waiting.
    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Fire every held acknowledgment, newest first.
    pub fn release_all(&self) {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        for (receipt, callback) in held.into_iter().rev() {
            callback(receipt);
        }
    }
}

impl BrokerConnection for MemoryBroker {
    fn state(&self) -> ConnectionState {
        self.gate.current()
    }

    fn send(&self, message: OutboundMessage, on_ack: AckCallback) -> Result<(), BrokerError> {
        let reply = self.reply.lock().unwrap().clone();
        if let Reply::Refuse(e) = reply {
            return Err(e);
        }
        let receipt = message.receipt.clone();
        self.sent.lock().unwrap().push(message);
        match reply {
            Reply::Ack => on_ack(receipt),
            _ => self.held.lock().unwrap().push((receipt, on_ack)),
        }
        Ok(())
    }

    fn forget(&self, receipt: &ReceiptId) {
        self.held.lock().unwrap().retain(|(held, _)| held != receipt);
    }
}

pub fn rest_config(timeout_ms: u64) -> RestConfig {
    RestConfig {
        send_confirm_timeout_ms: timeout_ms,
        ..RestConfig::default()
    }
}

/// Bridge router over `broker`, sharing its gate.
pub fn bridge_router(rest: &RestConfig, broker: Arc<MemoryBroker>) -> Router {
    let gate = broker.gate();
    let engine = Arc::new(CorrelationEngine::new(broker, rest.send_confirm_timeout()));
    BridgeServer::new(rest, engine, gate).into_router()
}

pub fn json_request(method: Method, path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Run one request through the router; returns status and JSON body.
pub async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub async fn post(router: Router, path: &str, body: &str) -> (StatusCode, Value) {
    call(router, json_request(Method::POST, path, body)).await
}

/// Path of a checked-in TLS fixture: `ca.pem` signs `server.pem`, issued for
/// `localhost` and 127.0.0.1, with its key in `server.key`.
pub fn tls_fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/tls")
        .join(name)
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
