pub mod base;
pub mod http_stream;
pub mod stdio;

use serde::{Deserialize, Serialize};

use crate::providers::base::{ServerIdentity, TransportKind};
use crate::providers::http_stream::HttpStreamServerParams;
use crate::providers::stdio::StdioServerParams;

/// Immutable description of one tool server and how to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ServerDescriptor {
    Stdio(StdioServerParams),
    HttpStream(HttpStreamServerParams),
}

impl ServerDescriptor {
    pub fn stdio(params: StdioServerParams) -> Self {
        ServerDescriptor::Stdio(params)
    }

    pub fn http_stream(params: HttpStreamServerParams) -> Self {
        ServerDescriptor::HttpStream(params)
    }

    /// Shorthand for an HTTP server with default headers and timeouts.
    pub fn url(url: impl Into<String>) -> Self {
        ServerDescriptor::HttpStream(HttpStreamServerParams::new(url))
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            ServerDescriptor::Stdio(_) => TransportKind::Stdio,
            ServerDescriptor::HttpStream(_) => TransportKind::HttpStream,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ServerDescriptor::Stdio(params) => params.display_name(),
            ServerDescriptor::HttpStream(params) => params.display_name(),
        }
    }

    pub fn identity(&self) -> ServerIdentity {
        match self {
            ServerDescriptor::Stdio(params) => params.identity(),
            ServerDescriptor::HttpStream(params) => params.identity(),
        }
    }
}
