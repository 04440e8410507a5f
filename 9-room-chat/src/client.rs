use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    cli::{ClientAction, ClientArgs},
    protocol::{ClientToServer, ServerToClient, read_message, write_message},
    room::RoomInfo,
};

pub async fn run(args: ClientArgs) -> Result<()> {
    match args.action.clone() {
        ClientAction::Greet { name } => greet(&args, name).await,
        ClientAction::Create { room } => create_room(&args, room).await,
        ClientAction::Get { room } => get_room(&args, room).await,
        ClientAction::List => list_rooms(&args).await,
        ClientAction::Send { room, author } => send_messages(&args, &room, &author).await,
        ClientAction::Stream { room } => stream_messages(&args, &room).await,
        ClientAction::Chat { room, author } => chat(&args, &room, &author).await,
    }
}

async fn greet(args: &ClientArgs, name: String) -> Result<()> {
    match call(args, ClientToServer::Greet { name }).await? {
        ServerToClient::Greeting { message } => write_stdout(&message).await?,
        other => return Err(unexpected(other)),
    }
    Ok(())
}

async fn create_room(args: &ClientArgs, id: String) -> Result<()> {
    match call(args, ClientToServer::CreateRoom { id }).await? {
        ServerToClient::RoomInfo { id, .. } => {
            write_stdout(&format!("*** created room {id}")).await?
        }
        other => return Err(unexpected(other)),
    }
    Ok(())
}

async fn get_room(args: &ClientArgs, id: String) -> Result<()> {
    match call(args, ClientToServer::GetRoomInfo { id }).await? {
        ServerToClient::RoomInfo { id, message_count } => {
            write_stdout(&render_room(&RoomInfo { id, message_count })).await?
        }
        other => return Err(unexpected(other)),
    }
    Ok(())
}

async fn list_rooms(args: &ClientArgs) -> Result<()> {
    let rooms = match call(args, ClientToServer::ListRooms).await? {
        ServerToClient::RoomList { rooms } => rooms,
        other => return Err(unexpected(other)),
    };

    if rooms.is_empty() {
        return Ok(write_stdout("*** no rooms").await?);
    }
    for room in &rooms {
        write_stdout(&render_room(room)).await?;
    }
    Ok(())
}

fn render_room(room: &RoomInfo) -> String {
    format!("{}: {} messages", room.id, room.message_count)
}

/// Performs one request/response exchange within the configured deadline.
async fn call(args: &ClientArgs, request: ClientToServer) -> Result<ServerToClient> {
    let deadline = Duration::from_millis(args.timeout_ms);
    let exchange = async {
        let (mut reader, mut writer) = establish_connection(args).await?;
        write_message(&mut writer, &request).await?;
        let response = read_message::<_, ServerToClient>(&mut reader)
            .await?
            .context("server closed the connection without answering")?;
        shutdown_connection(&mut writer).await;
        Ok::<_, anyhow::Error>(response)
    };

    let response = timeout(deadline, exchange)
        .await
        .map_err(|_| anyhow!("no answer within {}ms", args.timeout_ms))??;
    into_result(response)
}

async fn send_messages(args: &ClientArgs, room: &str, author: &str) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(args).await?;
    write_message(&mut writer, &ClientToServer::SendMessages).await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    loop {
        input.clear();
        select! {
            server_message = read_message::<_, ServerToClient>(&mut reader) => {
                // The server only speaks early to reject the stream.
                return match server_message? {
                    Some(message) => into_result(message).map(|_| ()),
                    None => Err(anyhow!("server closed the connection")),
                };
            }
            bytes_read = stdin.read_line(&mut input) => {
                if bytes_read? == 0 {
                    break;
                }
                let text = input.trim_end_matches(['\r', '\n']);
                if text.is_empty() {
                    continue;
                }
                write_message(
                    &mut writer,
                    &ClientToServer::Message {
                        room_id: room.to_string(),
                        author: author.to_string(),
                        content: text.to_string(),
                    },
                )
                .await?;
                if text == args.exit_token {
                    break;
                }
            }
        }
    }

    shutdown_connection(&mut writer).await;
    match read_message::<_, ServerToClient>(&mut reader).await? {
        Some(ServerToClient::SendResult { accepted: true }) => {
            write_stdout("*** messages accepted").await?;
            Ok(())
        }
        Some(other) => into_result(other).and_then(|other| Err(unexpected(other))),
        None => bail!("server closed the connection without acknowledging"),
    }
}

async fn stream_messages(args: &ClientArgs, room: &str) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(args).await?;
    write_message(
        &mut writer,
        &ClientToServer::SubscribeMessages {
            room_id: room.to_string(),
        },
    )
    .await?;

    loop {
        select! {
            server_message = read_message::<_, ServerToClient>(&mut reader) => {
                if !handle_stream_message(server_message).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    shutdown_connection(&mut writer).await;
    Ok(())
}

async fn handle_stream_message(message: io::Result<Option<ServerToClient>>) -> Result<bool> {
    match message? {
        Some(ServerToClient::Subscribed { room_id }) => {
            write_stdout(&format!("*** subscribed to {room_id}")).await?;
            Ok(true)
        }
        Some(ServerToClient::Message {
            author, content, ..
        }) => {
            write_stdout(&format!("[{author}] {content}")).await?;
            Ok(true)
        }
        Some(other) => Err(into_result(other).map_or_else(|err| err, unexpected)),
        None => {
            write_stdout("*** server closed the connection").await?;
            Ok(false)
        }
    }
}

async fn chat(args: &ClientArgs, room: &str, author: &str) -> Result<()> {
    let stream_args = args.clone();
    let stream_room = room.to_string();
    let stream = tokio::spawn(async move {
        if let Err(err) = stream_messages(&stream_args, &stream_room).await {
            warn!(error = %err, "message stream ended with error");
        }
    });

    let result = send_messages(args, room, author).await;
    stream.abort();
    result
}

async fn establish_connection(
    args: &ClientArgs,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    debug!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        info!(?error, "failed to shutdown client writer cleanly");
    }
}

/// Turns an `error` frame into an `Err`, passing any other frame through.
fn into_result(message: ServerToClient) -> Result<ServerToClient> {
    match message {
        ServerToClient::Error { code, message } => Err(anyhow!("{code}: {message}")),
        other => Ok(other),
    }
}

fn unexpected(message: ServerToClient) -> anyhow::Error {
    anyhow!("unexpected response from server: {message:?}")
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
