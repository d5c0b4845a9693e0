use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Subprocess speaking line-delimited JSON-RPC over stdin/stdout.
    Stdio,
    /// Long-lived HTTP event stream with messages posted back to the server.
    HttpStream,
}

impl TransportKind {
    pub fn as_key(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::HttpStream => "http_stream",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Cache key for a server.
///
/// Two descriptors share an identity only if everything that can change what
/// discovery returns is equal: the primary endpoint plus headers for HTTP, or
/// arguments, environment overrides and working directory for subprocesses.
/// Timeouts and names are deliberately excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerIdentity {
    pub kind: TransportKind,
    pub endpoint: String,
    qualifiers: Vec<(String, String)>,
}

impl ServerIdentity {
    pub fn new(kind: TransportKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            qualifiers: Vec::new(),
        }
    }

    /// Adds qualifiers; order of insertion does not matter.
    pub fn with_qualifiers(mut self, qualifiers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.qualifiers.extend(qualifiers);
        self.qualifiers.sort();
        self
    }

    pub fn qualifiers(&self) -> &[(String, String)] {
        &self.qualifiers
    }
}

// Qualifier values may carry credentials (e.g. Authorization headers), so only
// the kind and endpoint are displayed.
impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.endpoint)
    }
}

/// Serde adapter for durations written as fractional seconds (`2.5`).
pub(crate) mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| de::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn transport_kind_keys() {
        assert_eq!(TransportKind::Stdio.as_key(), "stdio");
        assert_eq!(TransportKind::HttpStream.as_key(), "http_stream");
        assert_eq!(
            serde_json::to_value(TransportKind::HttpStream).unwrap(),
            serde_json::json!("http_stream")
        );
    }

    #[test]
    fn identity_ignores_qualifier_order() {
        let a = ServerIdentity::new(TransportKind::HttpStream, "http://x/sse").with_qualifiers([
            ("header:a".to_string(), "1".to_string()),
            ("header:b".to_string(), "2".to_string()),
        ]);
        let b = ServerIdentity::new(TransportKind::HttpStream, "http://x/sse").with_qualifiers([
            ("header:b".to_string(), "2".to_string()),
            ("header:a".to_string(), "1".to_string()),
        ]);
        let c = ServerIdentity::new(TransportKind::HttpStream, "http://x/sse");

        let set: HashSet<_> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(a.to_string(), "http_stream:http://x/sse");
    }
}
