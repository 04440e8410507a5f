use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::Result;
use tokio::{
    io::BufReader,
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError},
};
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    error::RoomError,
    ingest,
    protocol::{ClientToServer, ServerToClient, classify_read_error, read_message, write_message},
    registry::RoomRegistry,
    relay,
};

type ConnectionId = u64;

pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    pub fn new(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            state: Arc::new(ServerState::new(config)),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared room registry, for inspection alongside the running server.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.state.registry)
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    let rooms = state.registry.room_count().await;
                    info!(rooms, "server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &state);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    state: &Arc<ServerState>,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, state),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, state: &Arc<ServerState>) {
    let permit = match state.try_admit() {
        Ok(permit) => permit,
        Err(_) => {
            warn!(peer = %peer, "connection rejected: limit reached");
            return;
        }
    };

    let state = Arc::clone(state);
    tokio::spawn(async move {
        let _permit = permit;
        let id = state.next_id();
        debug!(connection = id, peer = %peer, "new connection");

        if let Err(err) = handle_connection(stream, &state).await {
            warn!(connection = id, peer = %peer, error = %err, "connection closed with error");
        } else {
            debug!(connection = id, peer = %peer, "connection closed");
        }
    });
}

struct ServerState {
    registry: Arc<RoomRegistry>,
    config: ServerConfig,
    connection_semaphore: Option<Arc<Semaphore>>,
    next_id: AtomicU64,
}

impl ServerState {
    fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            registry: Arc::new(RoomRegistry::new()),
            config,
            connection_semaphore,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Takes a connection slot. The permit is `None` when connections are
    /// unlimited.
    fn try_admit(&self) -> Result<Option<OwnedSemaphorePermit>, TryAcquireError> {
        match &self.connection_semaphore {
            Some(semaphore) => Arc::clone(semaphore).try_acquire_owned().map(Some),
            None => Ok(None),
        }
    }
}

async fn handle_connection(stream: TcpStream, state: &ServerState) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let request = match read_message::<_, ClientToServer>(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(err) => {
                let err = classify_read_error(err)?;
                write_message(&mut writer, &ServerToClient::from(&err)).await?;
                continue;
            }
        };

        match request {
            ClientToServer::SendMessages => {
                return run_send_stream(state, &mut reader, &mut writer).await;
            }
            ClientToServer::SubscribeMessages { room_id } => {
                return run_subscription(state, &room_id, &mut reader, &mut writer).await;
            }
            unary => {
                let response = handle_unary(state, unary).await;
                write_message(&mut writer, &response).await?;
            }
        }
    }
}

async fn run_send_stream(
    state: &ServerState,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> Result<()> {
    debug!("send stream opened");
    let accepted = ingest::run(&state.registry, &state.config.exit_token, reader, writer).await?;
    info!(accepted, "send stream acknowledged");
    Ok(())
}

async fn run_subscription(
    state: &ServerState,
    room_id: &str,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> Result<()> {
    info!(room = %room_id, "subscriber joined");
    let end = relay::run(&state.registry, room_id, reader, writer).await?;
    info!(room = %room_id, ?end, "subscriber left");
    Ok(())
}

async fn handle_unary(state: &ServerState, request: ClientToServer) -> ServerToClient {
    let registry = &state.registry;
    let result = match request {
        ClientToServer::Greet { name } => {
            info!(%name, "greet request");
            Ok(ServerToClient::Greeting {
                message: format!("Hello, {name}."),
            })
        }
        ClientToServer::CreateRoom { id } => registry.create_room(&id).await.map(Into::into),
        ClientToServer::GetRoomInfo { id } => registry.get_room(&id).await.map(Into::into),
        ClientToServer::ListRooms => Ok(ServerToClient::RoomList {
            rooms: registry.list_rooms().await,
        }),
        other => Err(RoomError::InvalidArgument(format!(
            "'{}' frame is only valid inside a stream",
            other.name()
        ))),
    };

    result.unwrap_or_else(|err| {
        debug!(error = %err, "request failed");
        ServerToClient::from(&err)
    })
}
