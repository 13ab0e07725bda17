use std::time::Duration;

use serde::Deserialize;

// =======================================================
// SERVER CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening port. Required; there is no default.
    pub port: Option<u16>,
    pub bind: String,
    pub max_connections: usize,
    /// Deadline for a client to send request headers (idle keep-alive
    /// included) and, separately, the request body.
    pub client_read_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub max_request_body_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind: "0.0.0.0".into(),
            max_connections: 1024,
            client_read_timeout_secs: 15,
            shutdown_grace_secs: 10,
            max_request_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// `bind:port`, or `None` while the port is missing.
    pub fn listen_addr(&self) -> Option<String> {
        self.port.map(|port| format!("{}:{port}", self.bind))
    }

    pub fn client_read_timeout(&self) -> Duration {
        Duration::from_secs(self.client_read_timeout_secs)
    }
}

// =======================================================
// ORIGIN CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Absolute `http://` URL of the proxied service. Required.
    pub url: Option<String>,
    /// Append the inbound path and query to `url`.
    pub forward_path: bool,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_response_body_bytes: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: None,
            forward_path: false,
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            max_response_body_bytes: 10 * 1024 * 1024,
        }
    }
}
