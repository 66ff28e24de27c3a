//! Fixtures for the API tests: fake head nodes and a coordinator harness.

use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_test::TestServer;
use hydra_ledger::testing::{key_store, FakeCli};
use tempfile::TempDir;

use crate::config::{CoordinatorConfig, PartyEndpoint};
use crate::state::AppState;

pub use hydra_ledger::testing::{head_key_hex, SIGNED_CBOR};

/// Behavior of a fake head node.
#[derive(Clone)]
pub struct NodeScript {
    /// Tag returned by `GET /head`.
    pub head: &'static str,
    /// Whether `NewTx` is answered with `TxInvalid`.
    pub reject_tx: bool,
    /// Whether commands are read but never answered.
    pub silent: bool,
    /// Frames received on the control channel.
    pub frames: Arc<Mutex<Vec<serde_json::Value>>>,
    /// Number of `GET /head` requests.
    pub head_queries: Arc<Mutex<usize>>,
}

impl NodeScript {
    pub fn new(head: &'static str) -> Self {
        Self {
            head,
            reject_tx: false,
            silent: false,
            frames: Arc::default(),
            head_queries: Arc::default(),
        }
    }

    pub fn rejecting(mut self) -> Self {
        self.reject_tx = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn head_queries(&self) -> usize {
        *self.head_queries.lock().unwrap()
    }

    pub fn frames(&self) -> Vec<serde_json::Value> {
        self.frames.lock().unwrap().clone()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(node): State<NodeScript>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, node))
}

async fn handle_socket(mut socket: WebSocket, node: NodeScript) {
    let greeting = r#"{"tag":"Greetings","me":{"vkey":"aa"}}"#;
    if socket.send(Message::Text(greeting.to_string())).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
        node.frames.lock().unwrap().push(frame.clone());
        if node.silent {
            continue;
        }

        let reply = match frame["tag"].as_str().unwrap_or_default() {
            "Init" => serde_json::json!({ "tag": "HeadIsInitializing", "headId": "cafe" }),
            "Close" => serde_json::json!({ "tag": "HeadIsClosed" }),
            "Fanout" => serde_json::json!({ "tag": "HeadIsFinalized" }),
            "NewTx" if node.reject_tx => serde_json::json!({
                "tag": "TxInvalid",
                "validationError": { "reason": "BadInputs" },
            }),
            "NewTx" => serde_json::json!({ "tag": "TxValid", "transactionId": "beef" }),
            _ => serde_json::json!({ "tag": "CommandFailed" }),
        };
        let _ = socket.send(Message::Text(reply.to_string())).await;
    }
}

async fn head_handler(State(node): State<NodeScript>) -> Json<serde_json::Value> {
    *node.head_queries.lock().unwrap() += 1;
    Json(serde_json::json!({ "tag": node.head }))
}

async fn snapshot_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ab#0": { "address": "addr_test1alice", "value": { "lovelace": 7000000 } },
        "ab#1": { "address": "addr_test1bob", "value": { "lovelace": 3000000 } },
        "cd#0": { "address": "addr_test1bob", "value": { "lovelace": 2000000 } },
    }))
}

async fn post_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "tag": "Accepted" }))
}

/// Start a fake head node and return its port.
pub async fn spawn_node(script: NodeScript) -> u16 {
    let app = Router::new()
        .route("/", get(ws_handler))
        .route("/head", get(head_handler))
        .route("/snapshot/utxo", get(snapshot_handler))
        .route("/init", post(post_handler))
        .route("/close", post(post_handler))
        .route("/fanout", post(post_handler))
        .with_state(script);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Coordinator test harness.
pub struct Harness {
    pub server: TestServer,
    pub state: AppState,
    _keys: TempDir,
}

pub fn harness(keys: &[&str], parties: &[(&str, u16)]) -> Harness {
    let store = key_store(keys);
    let mut config = CoordinatorConfig::new(store.path());
    config.channel_timeout_ms = 1_000;
    config.status_timeout_ms = 1_000;
    config.parties = parties
        .iter()
        .map(|(id, port)| PartyEndpoint {
            id: id.to_string(),
            api_port: *port,
        })
        .collect();

    let state = AppState::new(config, Arc::new(FakeCli::default()));
    let server = TestServer::new(super::router(state.clone())).unwrap();
    Harness {
        server,
        state,
        _keys: store,
    }
}
