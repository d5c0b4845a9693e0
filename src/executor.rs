use futures::future::{join_all, BoxFuture};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::McpClientConfig;
use crate::errors::{McpClientError, Result};
use crate::format::format_call_result;
use crate::payload::{CallRequest, ToolPayload};
use crate::protocol::{CallToolResult, ToolSchemas};
use crate::providers::ServerDescriptor;
use crate::schema_cache::SchemaCache;
use crate::transports::{Connector, McpConnection, TransportConnector};

/// Outcome of one entry in a batch. Batch calls never fail as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(CallToolResult),
    Failure(String),
}

impl CallOutcome {
    fn from_result(result: Result<CallToolResult>) -> Self {
        match result {
            Ok(result) => CallOutcome::Success(result),
            Err(err) => CallOutcome::Failure(error_text(&err)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// Formatted output for successes, the error message for failures.
    pub fn into_text(self) -> String {
        match self {
            CallOutcome::Success(result) => format_call_result(&result),
            CallOutcome::Failure(message) => message,
        }
    }
}

/// Text placed at a failed batch position.
pub fn error_text(err: &McpClientError) -> String {
    format!("Error: {err}")
}

/// Run `op` on a freshly opened connection and always clean it up afterwards,
/// whether `op` succeeded, failed or was cancelled.
pub(crate) async fn scoped<T, F>(
    mut connection: Box<dyn McpConnection>,
    cancel: &CancellationToken,
    op: F,
) -> Result<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut (dyn McpConnection + 'static)) -> BoxFuture<'c, Result<T>> + Send,
{
    let outcome = tokio::select! {
        result = async {
            match connection.connect().await {
                Ok(()) => op(connection.as_mut()).await,
                Err(err) => Err(err),
            }
        } => result,
        _ = cancel.cancelled() => Err(McpClientError::Cancelled),
    };
    connection.cleanup().await;
    outcome
}

/// The async core behind every client entry point.
#[derive(Clone)]
pub struct Executor {
    config: McpClientConfig,
    connector: Arc<dyn Connector>,
    cache: Arc<SchemaCache>,
}

impl Executor {
    pub fn new(config: McpClientConfig) -> Self {
        Self {
            config,
            connector: Arc::new(TransportConnector),
            cache: SchemaCache::global(),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &McpClientConfig {
        &self.config
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Tool name to input schema for one server, from the cache when possible.
    pub async fn fetch_schemas(
        &self,
        descriptor: &ServerDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ToolSchemas> {
        let identity = descriptor.identity();
        if let Some(schemas) = self.cache.get(&identity).await {
            debug!(server = %identity, "schema cache hit");
            return Ok(schemas);
        }

        let connection = self
            .connector
            .open(descriptor, self.config.session_options(true));
        let schemas = scoped(connection, cancel, |conn| {
            Box::pin(async move {
                let tools = conn.list_tools().await?;
                Ok::<ToolSchemas, McpClientError>(
                    tools
                        .into_iter()
                        .map(|tool| (tool.name, tool.input_schema))
                        .collect(),
                )
            })
        })
        .await?;

        debug!(server = %identity, tools = schemas.len(), "caching discovered schemas");
        self.cache.insert(identity, schemas.clone()).await;
        Ok(schemas)
    }

    /// Schemas for every descriptor, fetched concurrently. Each position holds
    /// that descriptor's own outcome.
    pub async fn batch_fetch_schemas(
        &self,
        descriptors: &[ServerDescriptor],
        cancel: &CancellationToken,
    ) -> Vec<Result<ToolSchemas>> {
        // Dropping this future cancels the fetches it spawned.
        let batch = cancel.child_token();
        let _cancel_on_drop = batch.clone().drop_guard();

        let handles: Vec<_> = descriptors
            .iter()
            .cloned()
            .map(|descriptor| {
                let executor = self.clone();
                let cancel = batch.child_token();
                tokio::spawn(async move { executor.fetch_schemas(&descriptor, &cancel).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(McpClientError::Scheduler(format!("schema fetch task failed: {e}")))
                })
            })
            .collect()
    }

    /// Normalise `payload`, open a connection, call the tool and tear down.
    ///
    /// Payloads that are not tool calls fail before any connection is opened.
    pub async fn execute_one(
        &self,
        descriptor: &ServerDescriptor,
        payload: &ToolPayload,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult> {
        let request = CallRequest::try_from_payload(payload)?;
        self.call(descriptor, request, cancel).await
    }

    pub(crate) async fn call(
        &self,
        descriptor: &ServerDescriptor,
        request: CallRequest,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult> {
        let connection = self
            .connector
            .open(descriptor, self.config.session_options(false));
        let CallRequest {
            tool_name,
            parameters,
        } = request;
        scoped(connection, cancel, move |conn| {
            Box::pin(async move { conn.call_tool(Some(&tool_name), parameters).await })
        })
        .await
    }

    /// Call the same tool on every descriptor concurrently.
    ///
    /// The output has one entry per descriptor, in input order.
    pub async fn execute_batch_outcomes(
        &self,
        descriptors: &[ServerDescriptor],
        payload: &ToolPayload,
        cancel: &CancellationToken,
    ) -> Vec<CallOutcome> {
        if descriptors.is_empty() {
            return Vec::new();
        }

        let request = match CallRequest::try_from_payload(payload) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "batch payload is not a tool call");
                let message = error_text(&err);
                return vec![CallOutcome::Failure(message); descriptors.len()];
            }
        };

        // Dropping this future cancels the calls it spawned.
        let batch = cancel.child_token();
        let _cancel_on_drop = batch.clone().drop_guard();

        let handles: Vec<_> = descriptors
            .iter()
            .cloned()
            .map(|descriptor| {
                let executor = self.clone();
                let request = request.clone();
                let cancel = batch.child_token();
                tokio::spawn(async move {
                    let result = executor.call(&descriptor, request, &cancel).await;
                    if let Err(err) = &result {
                        warn!(server = %descriptor.name(), error = %err, "batch call failed");
                    }
                    CallOutcome::from_result(result)
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    CallOutcome::Failure(error_text(&McpClientError::Scheduler(format!(
                        "batch task failed: {e}"
                    ))))
                })
            })
            .collect()
    }

    /// [`Executor::execute_batch_outcomes`] rendered as text.
    pub async fn execute_batch(
        &self,
        descriptors: &[ServerDescriptor],
        payload: &ToolPayload,
        cancel: &CancellationToken,
    ) -> Vec<String> {
        self.execute_batch_outcomes(descriptors, payload, cancel)
            .await
            .into_iter()
            .map(CallOutcome::into_text)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionOptions;
    use crate::protocol::{ContentBlock, ToolDescriptor};
    use crate::transports::ConnectionState;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Hangs in `call_tool` until cancelled from outside.
    struct StuckConnection {
        state: ConnectionState,
        cleanups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl McpConnection for StuckConnection {
        fn name(&self) -> &str {
            "stuck"
        }

        fn state(&self) -> ConnectionState {
            self.state
        }

        async fn connect(&mut self) -> Result<()> {
            self.state = ConnectionState::Connected;
            Ok(())
        }

        async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
            Ok(Vec::new())
        }

        async fn call_tool(
            &mut self,
            _tool_name: Option<&str>,
            _arguments: Map<String, Value>,
        ) -> Result<CallToolResult> {
            futures::future::pending().await
        }

        async fn cleanup(&mut self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            self.state = ConnectionState::Disconnected;
        }
    }

    struct StuckConnector {
        cleanups: Arc<AtomicUsize>,
    }

    impl Connector for StuckConnector {
        fn open(&self, _descriptor: &ServerDescriptor, _options: SessionOptions) -> Box<dyn McpConnection> {
            Box::new(StuckConnection {
                state: ConnectionState::Disconnected,
                cleanups: Arc::clone(&self.cleanups),
            })
        }
    }

    #[tokio::test]
    async fn cancelled_calls_still_clean_up() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let executor = Executor::new(McpClientConfig::default()).with_connector(Arc::new(StuckConnector {
            cleanups: Arc::clone(&cleanups),
        }));
        let cancel = CancellationToken::new();
        let descriptors = vec![ServerDescriptor::url("http://a"), ServerDescriptor::url("http://b")];

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let outcomes = executor
            .execute_batch(&descriptors, &ToolPayload::from(json!({"tool": "t"})), &cancel)
            .await;

        assert_eq!(outcomes, vec!["Error: Operation cancelled".to_string(); 2]);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropping_a_batch_cancels_its_calls() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let executor = Executor::new(McpClientConfig::default()).with_connector(Arc::new(StuckConnector {
            cleanups: Arc::clone(&cleanups),
        }));
        let descriptors = vec![ServerDescriptor::url("http://a"), ServerDescriptor::url("http://b")];
        let payload = ToolPayload::from(json!({"tool": "t"}));

        let cancel = CancellationToken::new();
        let batch = executor.execute_batch(&descriptors, &payload, &cancel);
        assert!(tokio::time::timeout(Duration::from_millis(50), batch).await.is_err());

        for _ in 0..50 {
            if cleanups.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn invalid_batch_payload_fails_every_position_without_connecting() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let executor = Executor::new(McpClientConfig::default()).with_connector(Arc::new(StuckConnector {
            cleanups: Arc::clone(&cleanups),
        }));
        let descriptors = vec![ServerDescriptor::url("http://a"); 3];

        let outcomes = executor
            .execute_batch(&descriptors, &ToolPayload::from("hello there"), &CancellationToken::new())
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.starts_with("Error: Invalid tool call format")));
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn outcome_text() {
        let ok = CallOutcome::Success(CallToolResult {
            content: vec![ContentBlock::Text { text: "done".into() }],
            is_error: false,
            structured_content: None,
        });
        assert!(ok.is_success());
        assert_eq!(ok.into_text(), "done");
        assert_eq!(
            CallOutcome::from_result(Err(McpClientError::MissingToolName)).into_text(),
            "Error: Tool name missing in arguments"
        );
    }
}
