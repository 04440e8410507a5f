use std::io;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ErrorCode, RoomError};
use crate::room::RoomInfo;

/// Longest accepted frame, excluding the line terminator.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Frames a client may send.
///
/// `Greet`, `CreateRoom`, `GetRoomInfo` and `ListRooms` are unary calls.
/// `SendMessages` opens an ingest stream whose units are `Message` frames;
/// `SubscribeMessages` turns the connection into a relay stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    Greet {
        name: String,
    },
    CreateRoom {
        id: String,
    },
    GetRoomInfo {
        id: String,
    },
    ListRooms,
    SendMessages,
    Message {
        room_id: String,
        author: String,
        content: String,
    },
    SubscribeMessages {
        room_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    Greeting {
        message: String,
    },
    RoomInfo {
        id: String,
        message_count: usize,
    },
    RoomList {
        rooms: Vec<RoomInfo>,
    },
    SendResult {
        accepted: bool,
    },
    Subscribed {
        room_id: String,
    },
    Message {
        room_id: String,
        author: String,
        content: String,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl ClientToServer {
    /// Tag name of the frame, as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ClientToServer::Greet { .. } => "greet",
            ClientToServer::CreateRoom { .. } => "create_room",
            ClientToServer::GetRoomInfo { .. } => "get_room_info",
            ClientToServer::ListRooms => "list_rooms",
            ClientToServer::SendMessages => "send_messages",
            ClientToServer::Message { .. } => "message",
            ClientToServer::SubscribeMessages { .. } => "subscribe_messages",
        }
    }
}

impl From<RoomInfo> for ServerToClient {
    fn from(info: RoomInfo) -> Self {
        ServerToClient::RoomInfo {
            id: info.id,
            message_count: info.message_count,
        }
    }
}

impl From<&RoomError> for ServerToClient {
    fn from(error: &RoomError) -> Self {
        ServerToClient::Error {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    // Line-oriented framing keeps the protocol usable from netcat.
    let mut line = Vec::new();
    loop {
        line.clear();
        // Room for a `\r\n` terminator after a frame at the limit.
        let bytes = (&mut *reader)
            .take(MAX_FRAME_LEN as u64 + 2)
            .read_until(b'\n', &mut line)
            .await?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_ascii_end();
        if trimmed.len() > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame longer than {MAX_FRAME_LEN} bytes"),
            ));
        }
        if trimmed.is_empty() {
            continue;
        }

        let parsed = serde_json::from_slice(trimmed).map_err(to_io_error)?;
        return Ok(Some(parsed));
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = serde_json::to_vec(message).map_err(to_io_error)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Separates frames that failed to decode, which can still be answered with an
/// error frame, from transport failures.
pub fn classify_read_error(err: io::Error) -> Result<RoomError, io::Error> {
    if err.kind() == io::ErrorKind::InvalidData {
        Ok(RoomError::InvalidArgument(format!("malformed frame: {err}")))
    } else {
        Err(err)
    }
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn frames_use_snake_case_tags() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);

        write_message(
            &mut writer,
            &ClientToServer::SubscribeMessages {
                room_id: "general".into(),
            },
        )
        .await
        .expect("write message");
        drop(writer);

        let mut raw = String::new();
        reader.read_line(&mut raw).await.expect("read line");
        assert_eq!(
            raw.trim_end(),
            r#"{"type":"subscribe_messages","room_id":"general"}"#
        );
    }

    #[tokio::test]
    async fn skips_blank_lines_and_reports_eof() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);

        writer
            .write_all(b"\r\n\n{\"type\":\"list_rooms\"}\n")
            .await
            .expect("write raw");
        drop(writer);

        let parsed = read_message::<_, ClientToServer>(&mut reader)
            .await
            .expect("read message");
        assert_eq!(parsed, Some(ClientToServer::ListRooms));

        let eof = read_message::<_, ClientToServer>(&mut reader)
            .await
            .expect("read eof");
        assert_eq!(eof, None);
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_data() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);

        writer.write_all(b"{not json}\n").await.expect("write raw");

        let err = read_message::<_, ClientToServer>(&mut reader)
            .await
            .expect_err("malformed frame");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn oversized_frame_is_refused() {
        let mut oversized = vec![b'x'; MAX_FRAME_LEN + 1];
        oversized.push(b'\n');
        let mut reader = oversized.as_slice();

        let err = read_message::<_, ClientToServer>(&mut reader)
            .await
            .expect_err("oversized frame");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(classify_read_error(err).is_err());
    }

    #[tokio::test]
    async fn frame_at_the_limit_is_read() {
        let padding = MAX_FRAME_LEN - r#"{"type":"greet","name":""}"#.len();
        let frame = format!(r#"{{"type":"greet","name":"{}"}}"#, "a".repeat(padding));
        assert_eq!(frame.len(), MAX_FRAME_LEN);
        let raw = format!("{frame}\r\n{{\"type\":\"list_rooms\"}}\n");
        let mut reader = raw.as_bytes();

        let parsed = read_message::<_, ClientToServer>(&mut reader)
            .await
            .expect("frame at limit");
        assert_eq!(
            parsed,
            Some(ClientToServer::Greet {
                name: "a".repeat(padding)
            })
        );
        let next = read_message::<_, ClientToServer>(&mut reader)
            .await
            .expect("next frame");
        assert_eq!(next, Some(ClientToServer::ListRooms));
    }

    #[test]
    fn room_error_maps_to_error_frame() {
        let frame = ServerToClient::from(&RoomError::NotFound("lobby".into()));
        assert_eq!(
            frame,
            ServerToClient::Error {
                code: ErrorCode::NotFound,
                message: "room not found: lobby".into(),
            }
        );
    }
}
