//! Server-to-client stream of newly appended room messages.

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::select;
use tracing::debug;

use crate::protocol::{ServerToClient, write_message};
use crate::registry::RoomRegistry;

/// Why a relay stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The client closed its side or its socket failed.
    ClientGone,
    /// The room stopped existing.
    RoomClosed,
}

/// Forwards every message appended to `room_id` after subscription.
///
/// The relay sleeps on the room's change notification and wakes only when
/// messages arrive. It watches `reader` for client disconnect; anything the
/// client sends on a subscribed connection is discarded. End of input counts
/// as a disconnect: a subscriber that half-closes its write side (`nc -N`)
/// stops receiving, so it must keep the socket open for as long as it wants
/// messages. A missing room is reported with an `error` frame and returned as
/// the error.
pub async fn run<R, W>(
    registry: &RoomRegistry,
    room_id: &str,
    reader: &mut R,
    writer: &mut W,
) -> Result<RelayEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut subscription = match registry.subscribe(room_id).await {
        Ok(subscription) => subscription,
        Err(err) => {
            write_message(writer, &ServerToClient::from(&err)).await?;
            return Err(err.into());
        }
    };

    write_message(
        writer,
        &ServerToClient::Subscribed {
            room_id: subscription.room_id().to_string(),
        },
    )
    .await?;

    let subscribers = registry.subscriber_count(room_id).await.unwrap_or_default();
    debug!(room = %subscription.room_id(), subscribers, "relay started");

    let mut delivered = 0usize;
    let mut discard = [0u8; 256];

    let end = loop {
        select! {
            message = subscription.recv() => {
                let Some(message) = message else {
                    break RelayEnd::RoomClosed;
                };
                let frame = ServerToClient::Message {
                    room_id: room_id.to_string(),
                    author: message.author,
                    content: message.content,
                };
                if let Err(err) = write_message(writer, &frame).await {
                    debug!(room = %room_id, ?err, "failed to deliver message to subscriber");
                    break RelayEnd::ClientGone;
                }
                delivered += 1;
            }
            read = reader.read(&mut discard) => {
                match read {
                    Ok(0) | Err(_) => break RelayEnd::ClientGone,
                    Ok(_) => {}
                }
            }
        }
    };

    debug!(room = %subscription.room_id(), delivered, ?end, "relay finished");
    Ok(end)
}
