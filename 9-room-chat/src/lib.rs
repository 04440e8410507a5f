//! Minimal room-based chat service over TCP.
//!
//! Clients create named rooms, post into a room over a client-to-server
//! stream, and follow a room over a server-to-client stream. Each module
//! owns one concern:
//!
//! - [`room`] holds the message and room-snapshot value types.
//! - [`registry`] owns every room behind async locks and hands out
//!   subscriptions that wake on new messages instead of polling.
//! - [`ingest`] is the send-stream state machine (exit token, end of input,
//!   single acknowledgement).
//! - [`relay`] pushes each new message of a room to one subscriber and stops
//!   when the subscriber goes away.
//! - [`protocol`] is the JSON line protocol plus async read/write helpers.
//! - [`server`] accepts TCP connections and dispatches calls.
//! - [`client`] and [`cli`] make up the command-line front end; [`config`]
//!   carries the server settings.
//!
//! Unit tests live next to each module; `tests/` drives a real server over
//! TCP and the compiled binary end to end.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod room;
pub mod server;
