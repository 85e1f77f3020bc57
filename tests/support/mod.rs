#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use evm_balance_exporter::{AddressConfig, ChainConfig};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How the stub answers `eth_getBalance` for one address
#[derive(Clone, Debug)]
pub enum Reply {
    Balance(String),
    RpcError(String),
    NoResult,
    Garbage,
    Slow(Duration, String),
}

#[derive(Default)]
struct StubState {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<Value>>,
}

/// Local JSON-RPC endpoint serving canned balance replies
pub struct StubRpc {
    addr: SocketAddr,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubRpc {
    pub async fn spawn() -> Self {
        let state = Arc::new(StubState::default());
        let app = Router::new()
            .route("/", post(handle_rpc))
            .route("/down", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub rpc");
        let addr = listener.local_addr().expect("stub rpc address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub rpc server");
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn down_url(&self) -> String {
        format!("http://{}/down", self.addr)
    }

    pub fn reply(&self, address: &str, reply: Reply) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(address.to_string(), reply);
    }

    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for StubRpc {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_rpc(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    state.requests.lock().unwrap().push(body.clone());

    let address = body["params"][0].as_str().unwrap_or_default().to_string();
    let reply = state.replies.lock().unwrap().get(&address).cloned();

    match reply {
        Some(Reply::Balance(hex)) => Json(json!({"jsonrpc": "2.0", "id": 1, "result": hex})).into_response(),
        Some(Reply::RpcError(message)) => Json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32000, "message": message}
        }))
        .into_response(),
        Some(Reply::Garbage) => "<html>bad gateway</html>".into_response(),
        Some(Reply::Slow(delay, hex)) => {
            tokio::time::sleep(delay).await;
            Json(json!({"jsonrpc": "2.0", "id": 1, "result": hex})).into_response()
        }
        Some(Reply::NoResult) | None => Json(json!({"jsonrpc": "2.0", "id": 1})).into_response(),
    }
}

pub fn chain(name: &str, rpc_url: &str) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        rpc_url: rpc_url.to_string(),
        native_token_symbol: "ETH".to_string(),
        decimals: 18,
    }
}

pub fn watched(address: &str, label: &str, chains: &[&str]) -> AddressConfig {
    AddressConfig {
        address: address.to_string(),
        label: label.to_string(),
        chains: chains.iter().map(|c| c.to_string()).collect(),
    }
}

/// 1 ETH in wei, hex encoded
pub const ONE_ETHER_HEX: &str = "0xde0b6b3a7640000";
pub const ONE_ETHER: f64 = 1e18;
