pub mod http_stream;
pub mod session;
pub mod stdio;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::SessionOptions;
use crate::errors::Result;
use crate::protocol::{CallToolResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ToolDescriptor};
use crate::providers::ServerDescriptor;
use crate::transports::http_stream::StreamingHttpConnection;
use crate::transports::stdio::StdioConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// The capability set every connection offers, whatever carries its bytes.
///
/// A connection is bound to one server and owned by exactly one caller.
/// `cleanup` must be safe to call any number of times and never fails; faults
/// during teardown are logged.
#[async_trait]
pub trait McpConnection: Send {
    fn name(&self) -> &str;
    fn state(&self) -> ConnectionState;
    async fn connect(&mut self) -> Result<()>;
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>>;
    /// With `tool_name` unset the name is taken from the `tool_name`, `name` or
    /// `tool` argument, in that order, and those keys are removed before sending.
    async fn call_tool(
        &mut self,
        tool_name: Option<&str>,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult>;
    async fn cleanup(&mut self);
}

/// A framed, bidirectional JSON-RPC pipe to one server.
#[async_trait]
pub trait RpcChannel: Send {
    /// Send `request` and wait for the response carrying the same id.
    async fn exchange(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse>;
    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Opens channels for one transport kind.
#[async_trait]
pub trait Transport: Send + Sync {
    type Channel: RpcChannel;

    /// Default connection name when the descriptor does not set one.
    fn label(&self) -> String;
    async fn open(&self) -> Result<Self::Channel>;
}

/// Produces connections for descriptors. Executors only ever go through this
/// seam, which lets tests hand out scripted connections.
pub trait Connector: Send + Sync {
    fn open(&self, descriptor: &ServerDescriptor, options: SessionOptions) -> Box<dyn McpConnection>;
}

/// Picks the transport from the descriptor's kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportConnector;

impl Connector for TransportConnector {
    fn open(&self, descriptor: &ServerDescriptor, options: SessionOptions) -> Box<dyn McpConnection> {
        open_connection(descriptor, options)
    }
}

pub fn open_connection(descriptor: &ServerDescriptor, options: SessionOptions) -> Box<dyn McpConnection> {
    match descriptor {
        ServerDescriptor::Stdio(params) => {
            Box::new(StdioConnection::from_params(params.clone(), options))
        }
        ServerDescriptor::HttpStream(params) => {
            Box::new(StreamingHttpConnection::from_params(params.clone(), options))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::stdio::StdioServerParams;

    #[test]
    fn connector_names_connections_after_descriptor() {
        let connector = TransportConnector;
        let http = connector.open(
            &ServerDescriptor::url("http://localhost:9"),
            SessionOptions::default(),
        );
        assert_eq!(http.name(), "http_stream:http://localhost:9");
        assert_eq!(http.state(), ConnectionState::Disconnected);

        let stdio = connector.open(
            &ServerDescriptor::stdio(StdioServerParams::new("srv").with_name("local")),
            SessionOptions::default(),
        );
        assert_eq!(stdio.name(), "local");
        assert_eq!(stdio.state(), ConnectionState::Disconnected);
    }
}
