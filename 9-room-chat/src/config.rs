//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};

use crate::ingest::DEFAULT_EXIT_TOKEN;

/// Port used when no listen address is given.
pub const DEFAULT_PORT: u16 = 10000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Content value that closes a send stream
    pub exit_token: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            exit_token: DEFAULT_EXIT_TOKEN.to_string(),
            max_connections: 0,
        }
    }
}

impl ServerConfig {
    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the send-stream exit token
    pub fn exit_token(mut self, token: impl Into<String>) -> Self {
        self.exit_token = token.into();
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}
