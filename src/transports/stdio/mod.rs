// Subprocess transport: line-delimited JSON-RPC over the child's stdin/stdout
use async_trait::async_trait;
use encoding_rs::{DecoderResult, Encoding};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SessionOptions;
use crate::errors::{McpClientError, Result};
use crate::protocol::{match_response, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::providers::stdio::{DecodeErrorPolicy, StdioServerParams};
use crate::transports::session::ClientSession;
use crate::transports::{RpcChannel, Transport};

pub type StdioConnection = ClientSession<StdioTransport>;

impl StdioConnection {
    pub fn from_params(params: StdioServerParams, options: SessionOptions) -> Self {
        let name = params.name.clone();
        let transport = StdioTransport::new(params, options.shutdown_grace);
        ClientSession::new(transport, name, options)
    }
}

/// Look up a stdio text encoding by its WHATWG label, also accepting the
/// label with `-` and `_` removed (`latin-1`, `utf_8`).
///
/// Messages are framed by `\n`, so only encodings that keep ASCII bytes
/// intact are usable.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    let compact: String = label.chars().filter(|c| !matches!(c, '-' | '_')).collect();
    let encoding = Encoding::for_label(label.as_bytes())
        .or_else(|| Encoding::for_label(compact.as_bytes()))
        .ok_or_else(|| McpClientError::Protocol(format!("unknown encoding '{label}'")))?;
    if !encoding.is_ascii_compatible() {
        return Err(McpClientError::Protocol(format!(
            "encoding '{}' cannot carry line-delimited messages",
            encoding.name()
        )));
    }
    Ok(encoding)
}

/// Decode one line of server output according to `policy`.
pub fn decode_line(bytes: &[u8], encoding: &'static Encoding, policy: DecodeErrorPolicy) -> Result<String> {
    match policy {
        DecodeErrorPolicy::Strict => encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .ok_or_else(|| {
                McpClientError::Protocol(format!("server output is not valid {}", encoding.name()))
            }),
        DecodeErrorPolicy::Replace => Ok(encoding.decode_without_bom_handling(bytes).0.into_owned()),
        DecodeErrorPolicy::Ignore => Ok(decode_skipping_malformed(bytes, encoding)),
    }
}

fn decode_skipping_malformed(bytes: &[u8], encoding: &'static Encoding) -> String {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let mut text = String::with_capacity(
        decoder
            .max_utf8_buffer_length_without_replacement(bytes.len())
            .unwrap_or(bytes.len()),
    );
    let mut rest = bytes;
    loop {
        let (result, read) = decoder.decode_to_string_without_replacement(rest, &mut text, true);
        rest = &rest[read..];
        match result {
            DecoderResult::InputEmpty => return text,
            DecoderResult::Malformed(_, _) => continue,
            DecoderResult::OutputFull => text.reserve(rest.len() * 3 + 16),
        }
    }
}

/// Encode an outgoing message; text the encoding cannot represent is an error.
pub fn encode_line(text: &str, encoding: &'static Encoding) -> Result<Vec<u8>> {
    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(McpClientError::Protocol(format!(
            "message cannot be represented in {}",
            encoding.name()
        )));
    }
    Ok(bytes.into_owned())
}

pub struct StdioTransport {
    params: StdioServerParams,
    shutdown_grace: Duration,
}

impl StdioTransport {
    pub fn new(params: StdioServerParams, shutdown_grace: Duration) -> Self {
        Self {
            params,
            shutdown_grace,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.params.command);
        cmd.args(&self.params.args);

        if let Some(env) = &self.params.env {
            for (k, v) in env {
                cmd.env(k, v);
            }
        }

        if let Some(dir) = &self.params.cwd {
            cmd.current_dir(dir);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        // A cancelled or dropped session must not leave the server running.
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Transport for StdioTransport {
    type Channel = StdioChannel;

    fn label(&self) -> String {
        self.params.display_name()
    }

    async fn open(&self) -> Result<StdioChannel> {
        let server = self.label();
        let encoding = resolve_encoding(&self.params.encoding)
            .map_err(|e| McpClientError::connection(server.clone(), e))?;

        let mut child = self.command().spawn().map_err(|e| {
            McpClientError::connection(
                server.clone(),
                format!("failed to spawn '{}': {e}", self.params.command),
            )
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpClientError::connection(server.clone(), "failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpClientError::connection(server.clone(), "failed to get stdout"))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let server = server.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "stderr: {}", line);
                }
            })
        });

        debug!(server = %server, pid = ?child.id(), "spawned server process");
        Ok(StdioChannel {
            server,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            encoding,
            decode: self.params.decode_errors,
            shutdown_grace: self.shutdown_grace,
            stderr_task,
        })
    }
}

pub struct StdioChannel {
    server: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    encoding: &'static Encoding,
    decode: DecodeErrorPolicy,
    shutdown_grace: Duration,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioChannel {
    async fn write_message(&mut self, message: &impl serde::Serialize) -> Result<()> {
        let text = serde_json::to_string(message)
            .map_err(|e| McpClientError::Protocol(e.to_string()))?;
        let mut line = encode_line(&text, self.encoding)?;
        line.push(b'\n');

        let stdin = self.stdin.as_mut().ok_or_else(|| {
            McpClientError::connection(self.server.clone(), "stdin already closed")
        })?;
        let written = async {
            stdin.write_all(&line).await?;
            stdin.flush().await
        };
        written
            .await
            .map_err(|e| McpClientError::connection(self.server.clone(), format!("write failed: {e}")))
    }

    async fn read_message(&mut self) -> Result<Value> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = self.stdout.read_until(b'\n', &mut buf).await.map_err(|e| {
                McpClientError::connection(self.server.clone(), format!("read failed: {e}"))
            })?;
            if read == 0 {
                return Err(McpClientError::connection(
                    self.server.clone(),
                    "server process closed stdout",
                ));
            }

            let line = decode_line(&buf, self.encoding, self.decode)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => return Ok(value),
                // Servers sometimes log to stdout; only JSON lines are messages.
                Err(_) => debug!(server = %self.server, "skipping non-JSON line: {}", line),
            }
        }
    }
}

#[async_trait]
impl RpcChannel for StdioChannel {
    async fn exchange(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        self.write_message(request).await?;
        loop {
            let message = self.read_message().await?;
            if let Some(response) = match_response(message, request.id) {
                return Ok(response);
            }
        }
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<()> {
        self.write_message(notification).await
    }

    async fn close(&mut self) -> Result<()> {
        // Closing stdin is the polite shutdown signal.
        drop(self.stdin.take());

        let outcome = match tokio::time::timeout(self.shutdown_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %self.server, %status, "server process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(McpClientError::connection(self.server.clone(), e)),
            Err(_) => {
                warn!(server = %self.server, "server did not exit in time; killing it");
                self.child
                    .kill()
                    .await
                    .map_err(|e| McpClientError::connection(self.server.clone(), e))
            }
        };

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        outcome
    }
}
