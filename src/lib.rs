pub mod bridge;
pub mod config;
pub mod errors;
pub mod executor;
pub mod format;
pub mod loader;
pub mod logging;
pub mod payload;
pub mod protocol;
pub mod providers;
pub mod schema_cache;
pub mod transports;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use crate::bridge::{SchedulerContext, SyncBridge};
pub use crate::config::McpClientConfig;
pub use crate::errors::{McpClientError, Result};
pub use crate::executor::{error_text, CallOutcome, Executor};
pub use crate::format::{format_call_result, format_value};
pub use crate::payload::{normalize_payload, CallRequest, ToolPayload};
pub use crate::protocol::{CallToolResult, ContentBlock, ToolDescriptor, ToolSchemas};
pub use crate::providers::base::{ServerIdentity, TransportKind};
pub use crate::providers::http_stream::HttpStreamServerParams;
pub use crate::providers::stdio::{DecodeErrorPolicy, StdioServerParams};
pub use crate::providers::ServerDescriptor;
pub use crate::schema_cache::SchemaCache;
pub use crate::transports::{ConnectionState, Connector, McpConnection};

#[async_trait]
pub trait McpClientInterface: Send + Sync {
    async fn fetch_schemas(&self, descriptor: &ServerDescriptor) -> Result<ToolSchemas>;
    async fn batch_fetch_schemas(&self, descriptors: &[ServerDescriptor]) -> Vec<Result<ToolSchemas>>;
    async fn execute_one(
        &self,
        descriptor: &ServerDescriptor,
        payload: &ToolPayload,
    ) -> Result<CallToolResult>;
    async fn execute_batch(&self, descriptors: &[ServerDescriptor], payload: &ToolPayload) -> Vec<String>;
}

/// Entry point for discovering and calling tools on MCP servers.
///
/// Every operation opens its own connection and closes it before returning.
/// The `_blocking` variants may be called from any thread, inside a runtime or
/// not, and are bounded by the configured bridge timeout.
#[derive(Clone)]
pub struct McpClient {
    executor: Executor,
    bridge: SyncBridge,
}

impl McpClient {
    pub fn new(config: McpClientConfig) -> Self {
        let bridge = SyncBridge::from_config(&config);
        Self {
            executor: Executor::new(config),
            bridge,
        }
    }

    /// Use a private schema cache instead of the process-wide one.
    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.executor = self.executor.with_schema_cache(cache);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.executor = self.executor.with_connector(connector);
        self
    }

    pub fn config(&self) -> &McpClientConfig {
        self.executor.config()
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        self.executor.schema_cache()
    }

    /// Servers from the configured servers file, or from `MCP_URLS` when no
    /// file is configured.
    pub async fn load_servers(&self) -> anyhow::Result<Vec<ServerDescriptor>> {
        let servers = match &self.config().servers_file_path {
            Some(path) => loader::load_descriptors_from_file(path, self.config()).await?,
            None => loader::descriptors_from_urls(loader::load_server_urls(None).await),
        };
        info!("Loaded {} MCP server(s)", servers.len());
        Ok(servers)
    }

    /// Forget the cached schemas of one server.
    pub async fn invalidate_schemas(&self, descriptor: &ServerDescriptor) -> bool {
        self.schema_cache().invalidate(&descriptor.identity()).await
    }

    /// Like [`McpClientInterface::execute_batch`], keeping successes structured.
    pub async fn execute_batch_outcomes(
        &self,
        descriptors: &[ServerDescriptor],
        payload: &ToolPayload,
    ) -> Vec<CallOutcome> {
        self.executor
            .execute_batch_outcomes(descriptors, payload, &CancellationToken::new())
            .await
    }

    pub fn fetch_schemas_blocking(&self, descriptor: &ServerDescriptor) -> Result<ToolSchemas> {
        let executor = self.executor.clone();
        let descriptor = descriptor.clone();
        self.bridge
            .run(move |cancel| async move { executor.fetch_schemas(&descriptor, &cancel).await })
    }

    /// On timeout, fetches still in flight are cancelled and report
    /// [`McpClientError::Cancelled`]; finished fetches keep their result.
    pub fn batch_fetch_schemas_blocking(&self, descriptors: &[ServerDescriptor]) -> Vec<Result<ToolSchemas>> {
        let executor = self.executor.clone();
        let owned = descriptors.to_vec();
        let outcome = self.bridge.run(move |cancel| async move {
            Ok(executor.batch_fetch_schemas(&owned, &cancel).await)
        });
        match outcome {
            Ok(results) => results,
            Err(err) => descriptors.iter().map(|_| Err(replicate(&err))).collect(),
        }
    }

    pub fn execute_one_blocking(
        &self,
        descriptor: &ServerDescriptor,
        payload: &ToolPayload,
    ) -> Result<CallToolResult> {
        let executor = self.executor.clone();
        let descriptor = descriptor.clone();
        let payload = payload.clone();
        self.bridge.run(move |cancel| async move {
            executor.execute_one(&descriptor, &payload, &cancel).await
        })
    }

    /// Always one entry per descriptor, even when the bridge times out. Calls
    /// that finished before the deadline keep their output; only calls still
    /// pending carry an error.
    pub fn execute_batch_blocking(&self, descriptors: &[ServerDescriptor], payload: &ToolPayload) -> Vec<String> {
        let executor = self.executor.clone();
        let owned = descriptors.to_vec();
        let payload = payload.clone();
        let outcome = self.bridge.run(move |cancel| async move {
            Ok(executor.execute_batch(&owned, &payload, &cancel).await)
        });
        match outcome {
            Ok(results) => results,
            Err(err) => vec![error_text(&err); descriptors.len()],
        }
    }
}

/// Copy of a bridge failure for each batch position.
fn replicate(err: &McpClientError) -> McpClientError {
    match err {
        McpClientError::Timeout(limit) => McpClientError::Timeout(*limit),
        McpClientError::Cancelled => McpClientError::Cancelled,
        other => McpClientError::Scheduler(other.to_string()),
    }
}

#[async_trait]
impl McpClientInterface for McpClient {
    async fn fetch_schemas(&self, descriptor: &ServerDescriptor) -> Result<ToolSchemas> {
        self.executor
            .fetch_schemas(descriptor, &CancellationToken::new())
            .await
    }

    async fn batch_fetch_schemas(&self, descriptors: &[ServerDescriptor]) -> Vec<Result<ToolSchemas>> {
        self.executor
            .batch_fetch_schemas(descriptors, &CancellationToken::new())
            .await
    }

    async fn execute_one(
        &self,
        descriptor: &ServerDescriptor,
        payload: &ToolPayload,
    ) -> Result<CallToolResult> {
        self.executor
            .execute_one(descriptor, payload, &CancellationToken::new())
            .await
    }

    async fn execute_batch(&self, descriptors: &[ServerDescriptor], payload: &ToolPayload) -> Vec<String> {
        self.executor
            .execute_batch(descriptors, payload, &CancellationToken::new())
            .await
    }
}
