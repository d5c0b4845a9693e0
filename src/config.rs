use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::{Implementation, PROTOCOL_VERSION};

#[derive(Debug, Clone)]
pub struct McpClientConfig {
    /// Upper bound for every blocking entry point.
    pub bridge_timeout: Duration,
    /// Time a cancelled flow gets to run its cleanup before it is aborted.
    pub cancel_grace: Duration,
    /// Time a subprocess gets to exit after its stdin is closed before it is killed.
    pub shutdown_grace: Duration,
    pub client_name: String,
    pub client_version: String,
    pub protocol_version: String,
    pub variables: HashMap<String, String>,
    pub servers_file_path: Option<PathBuf>,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            bridge_timeout: Duration::from_secs(30),
            cancel_grace: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            variables: HashMap::new(),
            servers_file_path: None,
        }
    }
}

impl McpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = timeout;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_name = name.into();
        self.client_version = version.into();
        self
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn with_servers_file(mut self, path: PathBuf) -> Self {
        self.servers_file_path = Some(path);
        self
    }

    pub fn with_variable(mut self, key: String, value: String) -> Self {
        self.variables.insert(key, value);
        self
    }

    pub fn with_variables(mut self, vars: HashMap<String, String>) -> Self {
        self.variables.extend(vars);
        self
    }

    pub fn get_variable(&self, key: &str) -> Option<String> {
        // Check inline variables first
        if let Some(val) = self.variables.get(key) {
            return Some(val.clone());
        }

        std::env::var(key).ok()
    }

    /// Options handed to every connection this client opens.
    pub fn session_options(&self, cache_tools_list: bool) -> SessionOptions {
        SessionOptions {
            cache_tools_list,
            client_info: Implementation {
                name: self.client_name.clone(),
                version: self.client_version.clone(),
            },
            protocol_version: self.protocol_version.clone(),
            shutdown_grace: self.shutdown_grace,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Serve repeated `list_tools` calls from memory until invalidated.
    pub cache_tools_list: bool,
    pub client_info: Implementation,
    pub protocol_version: String,
    pub shutdown_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        McpClientConfig::default().session_options(false)
    }
}
