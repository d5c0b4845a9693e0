use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::providers::base::{ServerIdentity, TransportKind};

/// What to do with bytes on the server's stdout that are not valid text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorPolicy {
    /// Treat undecodable output as a protocol error.
    #[default]
    Strict,
    /// Drop invalid byte sequences.
    Ignore,
    /// Substitute U+FFFD for invalid byte sequences.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdioServerParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default = "StdioServerParams::default_encoding")]
    pub encoding: String,
    #[serde(default, alias = "encoding_error_handler")]
    pub decode_errors: DecodeErrorPolicy,
}

impl StdioServerParams {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            name: None,
            command: command.into(),
            args: Vec::new(),
            env: None,
            cwd: None,
            encoding: Self::default_encoding(),
            decode_errors: DecodeErrorPolicy::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_decode_errors(mut self, policy: DecodeErrorPolicy) -> Self {
        self.decode_errors = policy;
        self
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("stdio:{}", self.command))
    }

    pub fn identity(&self) -> ServerIdentity {
        let mut qualifiers: Vec<(String, String)> = self
            .args
            .iter()
            .enumerate()
            .map(|(i, arg)| (format!("arg:{i:04}"), arg.clone()))
            .collect();
        if let Some(env) = &self.env {
            qualifiers.extend(env.iter().map(|(k, v)| (format!("env:{k}"), v.clone())));
        }
        if let Some(cwd) = &self.cwd {
            qualifiers.push(("cwd".to_string(), cwd.display().to_string()));
        }
        ServerIdentity::new(TransportKind::Stdio, self.command.clone()).with_qualifiers(qualifiers)
    }

    fn default_encoding() -> String {
        "utf-8".to_string()
    }
}
