//! Typed failures for room-scoped operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by the room registry and the stream handlers built on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// No room with this id has been created.
    #[error("room not found: {0}")]
    NotFound(String),
    /// A room with this id already exists.
    #[error("room already exists: {0}")]
    AlreadyExists(String),
    /// The request was malformed (bad room id, unexpected frame, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::NotFound(_) => ErrorCode::NotFound,
            RoomError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            RoomError::InvalidArgument(_) => ErrorCode::InvalidArgument,
        }
    }
}

/// Wire representation of a [`RoomError`] kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    InvalidArgument,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::NotFound => "not found",
            ErrorCode::AlreadyExists => "already exists",
            ErrorCode::InvalidArgument => "invalid argument",
        };
        f.write_str(name)
    }
}
