/// Connection configuration for the Cassandra client
use cassaforte_proto::{DEFAULT_CQL_VERSION, DEFAULT_PORT};
use std::time::Duration;

/// Default upper bound for a single message, matching the framed transport's default frame size
pub const DEFAULT_MAX_FRAME_SIZE: usize = 15 * 1024 * 1024;

/// Where to connect and how the transport behaves
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Host name or address of the node
    pub hostname: String,

    /// Listener port of the remote API
    pub port: u16,

    /// CQL version requested right after the transport opens
    pub cql_version: String,

    /// Maximum time to establish the connection (None = no limit)
    pub connect_timeout: Option<Duration>,

    /// Maximum time for a single call (None = no limit)
    pub request_timeout: Option<Duration>,

    /// Maximum encoded size of a request or response in bytes
    pub max_frame_size: usize,

    /// Disable Nagle's algorithm on the socket
    pub tcp_nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: DEFAULT_PORT,
            cql_version: DEFAULT_CQL_VERSION.to_string(),
            connect_timeout: None,
            request_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for a host with default values
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Set the listener port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the CQL version sent on connect
    pub fn with_cql_version(mut self, version: impl Into<String>) -> Self {
        self.cql_version = version.into();
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the per-call timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the maximum message size
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn with_tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// URI the transport connects to
    pub fn endpoint_uri(&self) -> String {
        // IPv6 literals need brackets inside a URI authority
        if self.hostname.contains(':') && !self.hostname.starts_with('[') {
            format!("http://[{}]:{}", self.hostname, self.port)
        } else {
            format!("http://{}:{}", self.hostname, self.port)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.hostname.trim().is_empty() {
            return Err("hostname must not be empty".to_string());
        }

        if self.port == 0 {
            return Err("port must be greater than 0".to_string());
        }

        if self.cql_version.trim().is_empty() {
            return Err("cql_version must not be empty".to_string());
        }

        if self.max_frame_size == 0 {
            return Err("max_frame_size must be greater than 0".to_string());
        }

        if let Some(timeout) = self.connect_timeout {
            if timeout.is_zero() {
                return Err("connect_timeout must be greater than 0 when set".to_string());
            }
        }

        if let Some(timeout) = self.request_timeout {
            if timeout.is_zero() {
                return Err("request_timeout must be greater than 0 when set".to_string());
            }
        }

        Ok(())
    }
}
