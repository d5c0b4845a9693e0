use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::providers::base::{duration_secs, ServerIdentity, TransportKind};

/// Path segment the event stream lives under.
pub const SSE_PATH: &str = "/sse";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpStreamServerParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// Bound on opening the stream and on each posted message.
    #[serde(
        default = "HttpStreamServerParams::default_connect_timeout",
        with = "duration_secs",
        alias = "timeout"
    )]
    pub connect_timeout: Duration,
    /// Longest gap tolerated between two events while waiting for a response.
    #[serde(
        default = "HttpStreamServerParams::default_read_timeout",
        with = "duration_secs",
        alias = "sse_read_timeout"
    )]
    pub read_timeout: Duration,
}

impl HttpStreamServerParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
            headers: None,
            connect_timeout: Self::default_connect_timeout(),
            read_timeout: Self::default_read_timeout(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// The caller's URL with the event-stream path appended unless it is already there.
    pub fn sse_url(&self) -> String {
        let trimmed = self.url.trim_end_matches('/');
        if trimmed.ends_with(SSE_PATH) {
            trimmed.to_string()
        } else {
            format!("{trimmed}{SSE_PATH}")
        }
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("http_stream:{}", self.url))
    }

    pub fn identity(&self) -> ServerIdentity {
        let headers = self
            .headers
            .iter()
            .flatten()
            .map(|(k, v)| (format!("header:{}", k.to_ascii_lowercase()), v.clone()));
        ServerIdentity::new(TransportKind::HttpStream, self.sse_url()).with_qualifiers(headers)
    }

    fn default_connect_timeout() -> Duration {
        Duration::from_secs(5)
    }

    fn default_read_timeout() -> Duration {
        Duration::from_secs(300)
    }
}
