// Server descriptor loading from the environment, delimited strings and JSON files
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{error, warn};

use crate::config::McpClientConfig;
use crate::providers::ServerDescriptor;

/// Environment variable consulted when no source is given.
pub const URLS_ENV_VAR: &str = "MCP_URLS";

/// Collect server URLs from `source`, or from `MCP_URLS` when it is `None`.
///
/// A source naming an existing file is read as JSON: either an array of URLs
/// or an object with a `urls` array. Read or parse failures are logged and
/// yield no URLs. Any other source is split on `;` when it contains one,
/// otherwise on `,`.
pub async fn load_server_urls(source: Option<&str>) -> Vec<String> {
    let source = match source {
        Some(s) => s.to_string(),
        None => std::env::var(URLS_ENV_VAR).unwrap_or_default(),
    };
    if source.trim().is_empty() {
        return Vec::new();
    }

    if tokio::fs::metadata(&source)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
    {
        return match read_url_file(&source).await {
            Ok(urls) => urls,
            Err(e) => {
                error!("Failed to read MCP URLs from {}: {}", source, e);
                Vec::new()
            }
        };
    }

    split_urls(&source)
}

fn split_urls(source: &str) -> Vec<String> {
    let delimiter = if source.contains(';') { ';' } else { ',' };
    source
        .split(delimiter)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

async fn read_url_file(path: &str) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path).await?;
    let json: Value = serde_json::from_str(&contents)?;

    let entries = match json {
        Value::Array(arr) => arr,
        Value::Object(mut obj) => match obj.remove("urls") {
            Some(Value::Array(arr)) => arr,
            Some(_) => return Err(anyhow!("'urls' field must be an array")),
            None => {
                warn!("{} has no 'urls' field", path);
                Vec::new()
            }
        },
        _ => return Err(anyhow!("JSON root must be array or object")),
    };

    Ok(entries
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Null => None,
            Value::String(_) => None,
            other => Some(other.to_string()),
        })
        .collect())
}

/// HTTP stream descriptors with default headers and timeouts, one per URL.
pub fn descriptors_from_urls<I, S>(urls: I) -> Vec<ServerDescriptor>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    urls.into_iter().map(ServerDescriptor::url).collect()
}

/// Parse a servers JSON file
/// Supports multiple formats:
/// - Array: [{"transport": "stdio", ...}, ...]
/// - Object with servers array: {"servers": [{...}, ...]}
/// - Object with single server: {"servers": {...}}
/// - Object with a urls array: {"urls": ["http://...", ...]}
/// - Single server: {"transport": "http_stream", ...}
///
/// `transport` may also be spelled `type`, and may be omitted when the entry
/// has a `url` (HTTP) or a `command` (stdio). Bare strings are URLs.
pub async fn load_descriptors_from_file(
    path: impl AsRef<Path>,
    config: &McpClientConfig,
) -> Result<Vec<ServerDescriptor>> {
    let contents = tokio::fs::read_to_string(path).await?;
    let json: Value = serde_json::from_str(&contents)?;

    let server_values = parse_servers_json(json)?;

    let mut servers = Vec::new();
    for (index, mut server_value) in server_values.into_iter().enumerate() {
        substitute_variables(&mut server_value, config);
        servers.push(create_descriptor_from_value(server_value, index)?);
    }

    Ok(servers)
}

fn parse_servers_json(json: Value) -> Result<Vec<Value>> {
    match json {
        Value::Array(arr) => Ok(arr),

        Value::Object(obj) => {
            if let Some(servers_value) = obj.get("servers") {
                match servers_value {
                    Value::Array(arr) => Ok(arr.clone()),
                    Value::Object(_) => Ok(vec![servers_value.clone()]),
                    _ => Err(anyhow!("'servers' field must be an array or object")),
                }
            } else if let Some(urls) = obj.get("urls") {
                match urls {
                    Value::Array(arr) => Ok(arr.clone()),
                    _ => Err(anyhow!("'urls' field must be an array")),
                }
            } else {
                Ok(vec![Value::Object(obj)])
            }
        }

        _ => Err(anyhow!("JSON root must be array or object")),
    }
}

fn create_descriptor_from_value(value: Value, index: usize) -> Result<ServerDescriptor> {
    let mut obj = match value {
        Value::String(url) => return Ok(ServerDescriptor::url(url)),
        Value::Object(obj) => obj,
        _ => return Err(anyhow!("Server entry {} must be an object or a URL string", index)),
    };

    let transport = match obj
        .get("transport")
        .or_else(|| obj.get("type"))
        .and_then(Value::as_str)
    {
        Some(t) => normalize_transport(t)
            .ok_or_else(|| anyhow!("Unsupported transport '{}' in server entry {}", t, index))?,
        None if obj.contains_key("url") => "http_stream",
        None if obj.contains_key("command") => "stdio",
        None => {
            return Err(anyhow!(
                "Server entry {} needs a 'transport', a 'url' or a 'command'",
                index
            ))
        }
    };
    obj.remove("type");
    obj.insert("transport".to_string(), Value::String(transport.to_string()));

    serde_json::from_value(Value::Object(obj))
        .map_err(|e| anyhow!("Invalid server entry {}: {}", index, e))
}

fn normalize_transport(raw: &str) -> Option<&'static str> {
    match raw.to_ascii_lowercase().as_str() {
        "stdio" | "subprocess" => Some("stdio"),
        "http_stream" | "http-stream" | "sse" | "http" => Some("http_stream"),
        _ => None,
    }
}

fn substitute_variables(value: &mut Value, config: &McpClientConfig) {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = substitute_str(s, config);
            }
        }
        Value::Object(obj) => {
            for (_, v) in obj.iter_mut() {
                substitute_variables(v, config);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                substitute_variables(item, config);
            }
        }
        _ => {}
    }
}

/// Expand `${VAR}` and `$VAR` from config variables, then the environment.
/// Unknown variables are left as written.
fn substitute_str(input: &str, config: &McpClientConfig) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), config.get_variable(name)) {
            (false, Some(val)) => out.push_str(&val),
            _ => {
                out.push('$');
                out.push_str(&after[..consumed]);
            }
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}
