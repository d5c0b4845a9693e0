// In-process MCP server speaking the HTTP + event-stream framing.
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Response, StatusCode},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Default)]
pub struct MockStats {
    pub streams_opened: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub tool_calls: AtomicUsize,
    pub last_authorization: Mutex<Option<String>>,
}

#[derive(Clone, Default)]
struct MockState {
    sessions: Arc<Mutex<HashMap<u64, mpsc::Sender<String>>>>,
    next_session: Arc<AtomicU64>,
    stats: Arc<MockStats>,
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub stats: Arc<MockStats>,
}

impl MockServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start a mock server on an ephemeral port.
pub fn spawn_mock_server() -> MockServer {
    let state = MockState::default();
    let stats = Arc::clone(&state.stats);

    let app = Router::new()
        .route("/sse", get(open_stream))
        .route("/messages", post(receive_message))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        hyper::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });

    MockServer { addr, stats }
}

/// An address nothing listens on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn frame(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

async fn open_stream(State(state): State<MockState>, headers: HeaderMap) -> Response<Body> {
    state.stats.streams_opened.fetch_add(1, Ordering::SeqCst);
    *state.stats.last_authorization.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let session = state.next_session.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = mpsc::channel::<String>(32);
    state.sessions.lock().unwrap().insert(session, tx);

    let endpoint = frame("endpoint", &format!("/messages?session_id={session}"));
    let events = futures::stream::once(async move { endpoint })
        .chain(ReceiverStream::new(rx))
        .map(Ok::<String, std::convert::Infallible>);

    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::wrap_stream(events))
        .unwrap()
}

async fn receive_message(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
    Json(message): Json<Value>,
) -> StatusCode {
    let sender = query
        .get("session_id")
        .and_then(|s| s.parse::<u64>().ok())
        .and_then(|id| state.sessions.lock().unwrap().get(&id).cloned());
    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    let Some(id) = message.get("id").cloned() else {
        // Notifications get no reply.
        return StatusCode::ACCEPTED;
    };
    let method = message["method"].as_str().unwrap_or_default().to_string();
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    // Interleave a server notification to exercise response matching.
    let log = json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {"level": "info", "data": method}});
    let _ = sender.send(frame("message", &log.to_string())).await;

    let result = match method.as_str() {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "mock", "version": "0.1.0"}
        }),
        "tools/list" => {
            state.stats.list_calls.fetch_add(1, Ordering::SeqCst);
            json!({"tools": [
                {"name": "get_price", "description": "Latest price", "inputSchema": {"type": "object", "properties": {"ticker": {"type": "string"}}}},
                {"name": "echo", "inputSchema": {"type": "object"}}
            ]})
        }
        "tools/call" => {
            state.stats.tool_calls.fetch_add(1, Ordering::SeqCst);
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            match params["name"].as_str().unwrap_or_default() {
                "get_price" => {
                    let ticker = arguments["ticker"].as_str().unwrap_or("?").to_string();
                    json!({"content": [{"type": "text", "text": format!("{ticker}: 189.30")}]})
                }
                "fail" => json!({"content": [{"type": "text", "text": "boom"}], "isError": true}),
                _ => json!({"content": [{"type": "text", "text": arguments.to_string()}]}),
            }
        }
        other => {
            let error = json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": format!("unknown method {other}")}});
            let _ = sender.send(frame("message", &error.to_string())).await;
            return StatusCode::ACCEPTED;
        }
    };

    let response = json!({"jsonrpc": "2.0", "id": id, "result": result});
    let _ = sender.send(frame("message", &response.to_string())).await;
    StatusCode::ACCEPTED
}
