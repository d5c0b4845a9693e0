// HTTP event-stream transport: responses arrive on a long-lived SSE stream,
// requests are posted to the endpoint the server announces on that stream.
use async_trait::async_trait;
use eventsource_stream::{Event, Eventsource};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::SessionOptions;
use crate::errors::{McpClientError, Result};
use crate::protocol::{match_response, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::providers::http_stream::HttpStreamServerParams;
use crate::transports::session::ClientSession;
use crate::transports::{RpcChannel, Transport};

pub type StreamingHttpConnection = ClientSession<HttpStreamTransport>;

impl StreamingHttpConnection {
    pub fn from_params(params: HttpStreamServerParams, options: SessionOptions) -> Self {
        let name = params.name.clone();
        ClientSession::new(HttpStreamTransport::new(params), name, options)
    }
}

/// Event announcing where messages must be posted.
const ENDPOINT_EVENT: &str = "endpoint";
/// Event carrying one JSON-RPC message from the server.
const MESSAGE_EVENT: &str = "message";

type EventStream = BoxStream<'static, std::result::Result<Event, String>>;

pub struct HttpStreamTransport {
    params: HttpStreamServerParams,
}

impl HttpStreamTransport {
    pub fn new(params: HttpStreamServerParams) -> Self {
        Self { params }
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for (k, v) in self.params.headers.iter().flatten() {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| McpClientError::connection(self.label(), format!("invalid header '{k}': {e}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| McpClientError::connection(self.label(), format!("invalid value for header '{k}': {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl Transport for HttpStreamTransport {
    type Channel = SseChannel;

    fn label(&self) -> String {
        self.params.display_name()
    }

    async fn open(&self) -> Result<SseChannel> {
        let server = self.label();
        let stream_url = Url::parse(&self.params.sse_url())
            .map_err(|e| McpClientError::connection(server.clone(), format!("invalid url: {e}")))?;

        let client = Client::builder()
            .connect_timeout(self.params.connect_timeout)
            .default_headers(self.header_map()?)
            .build()
            .map_err(|e| McpClientError::connection(server.clone(), e))?;

        let request = client
            .get(stream_url.clone())
            .header(ACCEPT, "text/event-stream")
            .send();
        let response = tokio::time::timeout(self.params.connect_timeout, request)
            .await
            .map_err(|_| McpClientError::connection(server.clone(), "timed out opening event stream"))?
            .map_err(|e| McpClientError::connection(server.clone(), e))?;

        if !response.status().is_success() {
            return Err(McpClientError::connection(
                server,
                format!("event stream request failed: {}", response.status()),
            ));
        }

        let mut events: EventStream = response
            .bytes_stream()
            .eventsource()
            .map(|item| item.map_err(|e| e.to_string()))
            .boxed();

        let endpoint = tokio::time::timeout(self.params.connect_timeout, async {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) if event.event == ENDPOINT_EVENT => return Ok(event.data),
                    Ok(event) => {
                        debug!(server = %server, event = %event.event, "ignoring event before endpoint")
                    }
                    Err(e) => return Err(McpClientError::connection(server.clone(), e)),
                }
            }
            Err(McpClientError::connection(
                server.clone(),
                "event stream ended before an endpoint was announced",
            ))
        })
        .await
        .map_err(|_| McpClientError::connection(server.clone(), "timed out waiting for endpoint"))??;

        let post_url = stream_url.join(endpoint.trim()).map_err(|e| {
            McpClientError::connection(server.clone(), format!("invalid endpoint '{endpoint}': {e}"))
        })?;
        debug!(server = %server, endpoint = %post_url, "event stream open");

        Ok(SseChannel {
            server,
            client,
            post_url,
            events: Some(events),
            connect_timeout: self.params.connect_timeout,
            read_timeout: self.params.read_timeout,
        })
    }
}

pub struct SseChannel {
    server: String,
    client: Client,
    post_url: Url,
    events: Option<EventStream>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl SseChannel {
    async fn post(&mut self, message: &impl serde::Serialize) -> Result<()> {
        let send = self.client.post(self.post_url.clone()).json(message).send();
        let response = tokio::time::timeout(self.connect_timeout, send)
            .await
            .map_err(|_| McpClientError::connection(self.server.clone(), "timed out posting message"))?
            .map_err(|e| McpClientError::connection(self.server.clone(), e))?;

        if !response.status().is_success() {
            return Err(McpClientError::connection(
                self.server.clone(),
                format!("message rejected: {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Value> {
        let events = self.events.as_mut().ok_or_else(|| McpClientError::NotConnected {
            server: self.server.clone(),
        })?;
        loop {
            let next = tokio::time::timeout(self.read_timeout, events.next())
                .await
                .map_err(|_| {
                    McpClientError::connection(self.server.clone(), "timed out waiting for server event")
                })?;
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => return Err(McpClientError::connection(self.server.clone(), e)),
                None => {
                    return Err(McpClientError::connection(
                        self.server.clone(),
                        "event stream closed",
                    ))
                }
            };

            // Unnamed events default to "message".
            if !event.event.is_empty() && event.event != MESSAGE_EVENT {
                debug!(server = %self.server, event = %event.event, "ignoring event");
                continue;
            }
            match serde_json::from_str::<Value>(&event.data) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    return Err(McpClientError::Protocol(format!(
                        "Failed to parse SSE event: {e}"
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl RpcChannel for SseChannel {
    async fn exchange(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        self.post(request).await?;
        loop {
            let message = self.next_message().await?;
            if let Some(response) = match_response(message, request.id) {
                return Ok(response);
            }
        }
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<()> {
        self.post(notification).await
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the body stream closes the GET connection.
        self.events.take();
        Ok(())
    }
}
