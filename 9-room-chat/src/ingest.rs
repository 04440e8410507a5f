//! Client-to-server message stream.
//!
//! An ingest stream is `Open` until the client sends the exit token or stops
//! sending, at which point it becomes `Closed` and is acknowledged exactly
//! once with `send_result { accepted: true }`. Each accepted unit is an
//! individual append; a failure part way through leaves earlier appends in
//! place.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::debug;

use crate::error::RoomError;
use crate::protocol::{
    ClientToServer, ServerToClient, classify_read_error, read_message, write_message,
};
use crate::registry::RoomRegistry;

/// Content value that closes an ingest stream without being appended.
pub const DEFAULT_EXIT_TOKEN: &str = "/exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Open,
    Closed,
}

/// What the caller should do after feeding a unit to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStep {
    /// The unit was appended; keep reading.
    Continue,
    /// The session just closed; send the acknowledgement.
    Closed,
}

pub struct IngestSession<'a> {
    registry: &'a RoomRegistry,
    exit_token: &'a str,
    state: IngestState,
    accepted: usize,
}

impl<'a> IngestSession<'a> {
    pub fn new(registry: &'a RoomRegistry, exit_token: &'a str) -> Self {
        Self {
            registry,
            exit_token,
            state: IngestState::Open,
            accepted: 0,
        }
    }

    pub(crate) fn state(&self) -> IngestState {
        self.state
    }

    /// Number of messages this session has appended.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Handles one inbound unit.
    pub async fn accept(
        &mut self,
        room_id: &str,
        author: String,
        content: String,
    ) -> Result<IngestStep, RoomError> {
        if self.state() == IngestState::Closed {
            return Err(RoomError::InvalidArgument(
                "send stream is already closed".to_string(),
            ));
        }

        if content == self.exit_token {
            self.state = IngestState::Closed;
            return Ok(IngestStep::Closed);
        }

        self.registry
            .append_message(room_id, author, content)
            .await?;
        self.accepted += 1;
        Ok(IngestStep::Continue)
    }

    /// Handles end of input from the client. Closes like the exit token.
    pub fn finish(&mut self) -> IngestStep {
        match self.state {
            IngestState::Open => {
                self.state = IngestState::Closed;
                IngestStep::Closed
            }
            IngestState::Closed => IngestStep::Continue,
        }
    }
}

/// Drives an ingest stream off the wire until it closes or fails.
///
/// Returns the number of appended messages. Room errors are reported to the
/// client as an `error` frame and no acknowledgement is sent.
pub async fn run<R, W>(
    registry: &RoomRegistry,
    exit_token: &str,
    reader: &mut R,
    writer: &mut W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = IngestSession::new(registry, exit_token);

    loop {
        let step = match read_message::<_, ClientToServer>(reader).await {
            Ok(Some(ClientToServer::Message {
                room_id,
                author,
                content,
            })) => session.accept(&room_id, author, content).await,
            Ok(Some(other)) => Err(RoomError::InvalidArgument(format!(
                "unexpected '{}' frame in send stream",
                other.name()
            ))),
            Ok(None) => Ok(session.finish()),
            Err(err) => Err(classify_read_error(err)?),
        };

        match step {
            Ok(IngestStep::Continue) => {}
            Ok(IngestStep::Closed) => {
                write_message(writer, &ServerToClient::SendResult { accepted: true }).await?;
                debug!(accepted = session.accepted(), "send stream closed");
                return Ok(session.accepted());
            }
            Err(err) => {
                write_message(writer, &ServerToClient::from(&err)).await?;
                return Err(err.into());
            }
        }
    }
}
