use std::time::Duration;

use thiserror::Error;

/// Represents errors that can occur while talking to tool servers.
#[derive(Error, Debug)]
pub enum McpClientError {
    /// Opening the transport or completing the initialize handshake failed.
    #[error("Connection to '{server}' failed: {reason}")]
    Connection {
        /// Connection name (`stdio:<command>` or `http_stream:<url>` unless overridden).
        server: String,
        /// Failure reason.
        reason: String,
    },
    /// The payload was recognised but no tool name could be resolved from it.
    #[error("Tool name missing in arguments")]
    MissingToolName,
    /// The payload is not JSON or has none of the recognised call shapes.
    #[error("Invalid tool call format: {0}")]
    InvalidPayload(String),
    /// The server reported a tool-level failure.
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution {
        /// Tool that was invoked.
        tool: String,
        /// Message reported by the server.
        message: String,
    },
    /// The bridge gave up waiting for a flow.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// An operation that needs a live session ran before `connect()`.
    #[error("Server '{server}' not connected. Call connect() first.")]
    NotConnected {
        /// Connection name.
        server: String,
    },
    /// The server sent something that is not a valid protocol message.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The flow was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,
    /// A scheduler could not be created or a bridged task died.
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl McpClientError {
    pub(crate) fn connection(server: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            server: server.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, McpClientError>;
