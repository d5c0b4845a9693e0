mod support;

use rs_mcp_flow::transports::http_stream::StreamingHttpConnection;
use rs_mcp_flow::{
    format_call_result, ConnectionState, HttpStreamServerParams, McpClient, McpClientConfig,
    McpClientError, McpClientInterface, McpConnection, SchemaCache, ServerDescriptor, ToolPayload,
};
use serde_json::{json, Map};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use support::{closed_port_url, spawn_mock_server};

fn client() -> McpClient {
    McpClient::new(McpClientConfig::new()).with_schema_cache(Arc::new(SchemaCache::new()))
}

#[tokio::test]
async fn session_lifecycle_over_event_stream() {
    let server = spawn_mock_server();
    let params = HttpStreamServerParams::new(server.url()).with_header("Authorization", "Bearer abc");
    let mut connection = StreamingHttpConnection::from_params(params, McpClientConfig::new().session_options(false));

    connection.connect().await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(
        connection.server_info().unwrap().server_info.as_ref().unwrap().name,
        "mock"
    );
    assert_eq!(
        server.stats.last_authorization.lock().unwrap().as_deref(),
        Some("Bearer abc")
    );

    let tools = connection.list_tools().await.unwrap();
    assert_eq!(tools.len(), 2);

    let mut args = Map::new();
    args.insert("ticker".into(), json!("MSFT"));
    let result = connection.call_tool(Some("get_price"), args).await.unwrap();
    assert_eq!(format_call_result(&result), "MSFT: 189.30");

    let err = connection.call_tool(Some("fail"), Map::new()).await.unwrap_err();
    assert!(matches!(err, McpClientError::ToolExecution { ref message, .. } if message == "boom"));

    connection.cleanup().await;
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn execute_one_over_event_stream() {
    let server = spawn_mock_server();
    let payload = ToolPayload::from(json!({"tool": "get_price", "parameters": {"ticker": "AAPL"}}));

    let result = client()
        .execute_one(&ServerDescriptor::url(server.url()), &payload)
        .await
        .unwrap();

    assert_eq!(format_call_result(&result), "AAPL: 189.30");
    assert_eq!(server.stats.tool_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_schemas_hits_the_server_once() {
    let server = spawn_mock_server();
    let client = client();
    let descriptor = ServerDescriptor::url(format!("{}/sse", server.url()));

    let first = client.fetch_schemas(&descriptor).await.unwrap();
    let second = client.fetch_schemas(&descriptor).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first["get_price"].as_ref().unwrap()["properties"]["ticker"]["type"],
        json!("string")
    );
    assert_eq!(server.stats.streams_opened.load(Ordering::SeqCst), 1);
    assert_eq!(server.stats.list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_preserves_order_around_failures() {
    let server = spawn_mock_server();
    let descriptors = vec![
        ServerDescriptor::http_stream(
            HttpStreamServerParams::new(closed_port_url()).with_connect_timeout(Duration::from_secs(2)),
        ),
        ServerDescriptor::url(server.url()),
    ];
    let payload = ToolPayload::from(r#"{"tool_name": "get_price", "ticker": "NVDA"}"#);

    let results = client().execute_batch(&descriptors, &payload).await;

    assert_eq!(results.len(), 2);
    assert!(results[0].starts_with("Error: Connection to"), "{}", results[0]);
    assert_eq!(results[1], "NVDA: 189.30");
}

#[tokio::test]
async fn tool_errors_are_reported_in_place() {
    let server = spawn_mock_server();
    let descriptors = vec![ServerDescriptor::url(server.url()); 2];

    let results = client()
        .execute_batch(&descriptors, &ToolPayload::from(json!({"name": "fail"})))
        .await;

    assert_eq!(results, vec!["Error: Tool 'fail' failed: boom".to_string(); 2]);
}

#[test]
fn blocking_calls_from_plain_threads() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async { spawn_mock_server() });
    let client = client();
    let descriptor = ServerDescriptor::url(server.url());

    let schemas = client.fetch_schemas_blocking(&descriptor).unwrap();
    assert!(schemas.contains_key("echo"));

    let results = client.execute_batch_blocking(
        &[descriptor.clone(), descriptor],
        &ToolPayload::from(json!({"tool": "echo", "parameters": {"x": 1}})),
    );
    assert_eq!(results, vec![r#"{"x":1}"#.to_string(); 2]);
}
