use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, accepting TCP connections.
    Server(ServerArgs),
    /// Call the chat server.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:10000")]
    pub listen: SocketAddr,

    /// Message content that closes a send stream.
    #[arg(long, default_value = crate::ingest::DEFAULT_EXIT_TOKEN)]
    pub exit_token: String,

    /// Maximum concurrent connections (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    pub max_connections: usize,
}

impl ServerArgs {
    pub fn config(&self) -> ServerConfig {
        ServerConfig::default()
            .bind(self.listen)
            .exit_token(self.exit_token.clone())
            .max_connections(self.max_connections)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:10000")]
    pub server: SocketAddr,

    /// Deadline for single request/response calls, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,

    /// Input line that ends a send stream.
    #[arg(long, default_value = crate::ingest::DEFAULT_EXIT_TOKEN)]
    pub exit_token: String,

    #[command(subcommand)]
    pub action: ClientAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ClientAction {
    /// Ask the server for a greeting.
    Greet { name: String },
    /// Create a room.
    Create { room: String },
    /// Show a room's message count.
    Get { room: String },
    /// List all rooms.
    List,
    /// Send stdin lines to a room until the exit token or end of input.
    Send { room: String, author: String },
    /// Print messages posted to a room from now on.
    Stream { room: String },
    /// Stream a room while sending stdin lines to it.
    Chat { room: String, author: String },
}
