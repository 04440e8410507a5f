//! Passive value types shared by the registry, the stream handlers and the
//! wire protocol.

use serde::{Deserialize, Serialize};

use crate::error::RoomError;

/// Longest accepted room id, in bytes.
pub const MAX_ROOM_ID_LEN: usize = 128;

/// A single chat message. Ordering within a room is append order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub author: String,
    pub content: String,
}

impl Message {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
        }
    }
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: String,
    pub message_count: usize,
}

/// Checks that `id` is usable as a room id.
///
/// Ids must be non-empty, free of surrounding whitespace and control
/// characters, and at most [`MAX_ROOM_ID_LEN`] bytes long.
pub fn validate_room_id(id: &str) -> Result<(), RoomError> {
    if id.is_empty() {
        return Err(RoomError::InvalidArgument(
            "room id cannot be empty".to_string(),
        ));
    }
    if id.len() > MAX_ROOM_ID_LEN {
        return Err(RoomError::InvalidArgument(format!(
            "room id is longer than {MAX_ROOM_ID_LEN} bytes"
        )));
    }
    if id.trim() != id {
        return Err(RoomError::InvalidArgument(format!(
            "room id '{id}' has surrounding whitespace"
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(RoomError::InvalidArgument(
            "room id contains control characters".to_string(),
        ));
    }
    Ok(())
}
