// Transport-independent MCP client session
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::config::SessionOptions;
use crate::errors::{McpClientError, Result};
use crate::format::format_call_result;
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, ListToolsResult, ToolDescriptor, ToolSchemas,
    METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_LIST_TOOLS,
};
use crate::transports::{ConnectionState, McpConnection, RpcChannel, Transport};

/// Argument keys that may carry the tool name, in lookup order.
pub const RESERVED_NAME_KEYS: [&str; 3] = ["tool_name", "name", "tool"];

/// Resolve the tool to invoke.
///
/// An explicit name wins and leaves `arguments` untouched. Otherwise the first
/// non-empty string under a reserved key is used and all reserved keys are
/// removed so the name is not sent twice.
pub fn resolve_tool_name(explicit: Option<&str>, arguments: &mut Map<String, Value>) -> Result<String> {
    if let Some(name) = explicit.filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }

    let found = RESERVED_NAME_KEYS.iter().find_map(|key| {
        arguments
            .get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    });
    for key in RESERVED_NAME_KEYS {
        arguments.remove(key);
    }

    found.ok_or(McpClientError::MissingToolName)
}

/// A protocol session over any [`Transport`].
///
/// Moves through `Disconnected -> Connecting -> Connected -> Closing ->
/// Disconnected`; a failed handshake tears the channel down before returning.
pub struct ClientSession<T: Transport> {
    name: String,
    transport: T,
    options: SessionOptions,
    state: ConnectionState,
    channel: Option<T::Channel>,
    next_id: u64,
    server_info: Option<InitializeResult>,
    cache_dirty: bool,
    tools: Option<Vec<ToolDescriptor>>,
    schema_index: Option<ToolSchemas>,
}

impl<T: Transport> ClientSession<T> {
    pub fn new(transport: T, name: Option<String>, options: SessionOptions) -> Self {
        let name = name.unwrap_or_else(|| transport.label());
        Self {
            name,
            transport,
            options,
            state: ConnectionState::Disconnected,
            channel: None,
            next_id: 1,
            server_info: None,
            cache_dirty: true,
            tools: None,
            schema_index: None,
        }
    }

    /// What the server reported during `initialize`.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Force the next `list_tools` to go to the server.
    pub fn invalidate_tools_cache(&mut self) {
        self.cache_dirty = true;
    }

    /// Tool name to schema, built by the last `list_tools`.
    pub fn tool_schemas(&self) -> Result<&ToolSchemas> {
        self.schema_index.as_ref().ok_or_else(|| {
            McpClientError::Protocol("Schemas not loaded; call list_tools() first".to_string())
        })
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state == ConnectionState::Connected && self.channel.is_some() {
            Ok(())
        } else {
            Err(McpClientError::NotConnected {
                server: self.name.clone(),
            })
        }
    }

    async fn rpc(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<std::result::Result<Value, JsonRpcError>> {
        let id = self.next_id;
        self.next_id += 1;
        let request = JsonRpcRequest::new(id, method, params);

        let channel = self.channel.as_mut().ok_or_else(|| McpClientError::NotConnected {
            server: self.name.clone(),
        })?;
        debug!(server = %self.name, id, method, "sending request");
        let response = channel.exchange(&request).await?;
        Ok(response.into_result())
    }

    async fn request<R: DeserializeOwned>(&mut self, method: &str, params: Value) -> Result<R> {
        let value = self.rpc(method, params).await?.map_err(|e| {
            McpClientError::Protocol(format!("{method} failed on '{}': {e}", self.name))
        })?;
        serde_json::from_value(value)
            .map_err(|e| McpClientError::Protocol(format!("malformed {method} result: {e}")))
    }

    async fn handshake(&mut self) -> Result<()> {
        let channel = self.transport.open().await?;
        self.channel = Some(channel);

        let params = InitializeParams {
            protocol_version: self.options.protocol_version.clone(),
            capabilities: json!({}),
            client_info: self.options.client_info.clone(),
        };
        let params = serde_json::to_value(params)
            .map_err(|e| McpClientError::Protocol(e.to_string()))?;
        let info: InitializeResult = self.request(METHOD_INITIALIZE, params).await?;
        if info.protocol_version != self.options.protocol_version {
            debug!(
                server = %self.name,
                requested = %self.options.protocol_version,
                negotiated = %info.protocol_version,
                "server negotiated a different protocol version"
            );
        }
        self.server_info = Some(info);

        let channel = self.channel.as_mut().ok_or_else(|| McpClientError::NotConnected {
            server: self.name.clone(),
        })?;
        channel
            .notify(&JsonRpcNotification::new(METHOD_INITIALIZED))
            .await
    }
}

#[async_trait]
impl<T: Transport> McpConnection for ClientSession<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;

        match self.handshake().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                info!(server = %self.name, "connected");
                Ok(())
            }
            Err(err) => {
                error!(server = %self.name, error = %err, "Error initializing MCP server");
                self.cleanup().await;
                Err(match err {
                    McpClientError::Connection { .. } => err,
                    other => McpClientError::connection(self.name.clone(), other),
                })
            }
        }
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        self.ensure_connected()?;
        if self.options.cache_tools_list && !self.cache_dirty {
            if let Some(tools) = &self.tools {
                return Ok(tools.clone());
            }
        }
        self.cache_dirty = false;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let page: ListToolsResult = self.request(METHOD_LIST_TOOLS, params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        warn!(server = %self.name, cursor = %next, "tool list cursor repeated; stopping");
                        break;
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        debug!(server = %self.name, count = tools.len(), "discovered tools");
        self.schema_index = Some(
            tools
                .iter()
                .map(|t| (t.name.clone(), t.input_schema.clone()))
                .collect(),
        );
        self.tools = Some(tools.clone());
        Ok(tools)
    }

    async fn call_tool(
        &mut self,
        tool_name: Option<&str>,
        mut arguments: Map<String, Value>,
    ) -> Result<CallToolResult> {
        self.ensure_connected()?;
        let tool = resolve_tool_name(tool_name, &mut arguments)?;
        debug!(server = %self.name, tool = %tool, "calling tool");

        let params = serde_json::to_value(CallToolParams {
            name: tool.clone(),
            arguments,
        })
        .map_err(|e| McpClientError::Protocol(e.to_string()))?;

        let value = match self.rpc(METHOD_CALL_TOOL, params).await? {
            Ok(value) => value,
            Err(e) => {
                return Err(McpClientError::ToolExecution {
                    tool,
                    message: e.to_string(),
                })
            }
        };
        let result: CallToolResult = serde_json::from_value(value)
            .map_err(|e| McpClientError::Protocol(format!("malformed tools/call result: {e}")))?;

        if result.is_error {
            return Err(McpClientError::ToolExecution {
                tool,
                message: format_call_result(&result),
            });
        }
        Ok(result)
    }

    async fn cleanup(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            self.state = ConnectionState::Closing;
            if let Err(err) = channel.close().await {
                warn!(server = %self.name, error = %err, "Error during cleanup");
            }
            debug!(server = %self.name, "disconnected");
        }
        self.state = ConnectionState::Disconnected;
        self.server_info = None;
        self.tools = None;
        self.schema_index = None;
    }
}

impl<T: Transport> Drop for ClientSession<T> {
    fn drop(&mut self) {
        if self.channel.is_some() {
            // The channel's own Drop releases the process or stream.
            debug!(server = %self.name, "session dropped without cleanup");
        }
    }
}
