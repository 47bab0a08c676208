//! Per-connection command loops.
//!
//! Each connection is served strictly in order: a command is decoded,
//! executed to completion, and (where the transport allows) acknowledged
//! before the next one is read.

use std::future::Future;

use axum::extract::ws::{Message, WebSocket};
use tokio::{io::AsyncBufRead, select};
use tracing::{debug, info, warn};

use crate::{
    command::{Command, Reply, read_frame},
    error::TransportError,
    executor::Executor,
};

/// Serves a newline-framed byte stream.
///
/// Fire-and-forget: nothing is written back. A payload that fails to decode
/// ends the connection, as does any read error.
pub async fn serve_stream<R, F>(
    reader: &mut R,
    executor: &Executor,
    shutdown: F,
) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let frame = select! {
            biased;
            _ = &mut shutdown => {
                debug!("closing connection for shutdown");
                break;
            }
            frame = read_frame(reader) => frame?,
        };

        let Some(frame) = frame else {
            debug!("peer closed the connection");
            break;
        };

        let command = Command::decode(&frame)?;
        info!(action = %command.action, "received command");
        if let Err(err) = executor.run(command).await {
            debug!(error = %err, "command dropped");
        }
    }

    Ok(())
}

/// Decodes and executes one message, producing the acknowledgement for the peer.
pub async fn respond_to(executor: &Executor, payload: &[u8]) -> Reply {
    let command = match Command::decode(payload) {
        Ok(command) => command,
        Err(err) => {
            warn!(error = %err, "failed to parse command");
            return Reply::invalid_format();
        }
    };

    info!(action = %command.action, "received command");
    match executor.run(command).await {
        Ok(()) => Reply::executed(),
        Err(err) => Reply::error(err.to_string()),
    }
}

/// Serves an upgraded WebSocket.
///
/// Greets the peer, then answers every message with a [`Reply`]. Malformed
/// messages are answered with an error and the loop keeps reading.
pub async fn serve_socket<F>(
    mut socket: WebSocket,
    executor: &Executor,
    shutdown: F,
) -> Result<(), TransportError>
where
    F: Future<Output = ()>,
{
    send_reply(&mut socket, &Reply::connected()).await?;
    tokio::pin!(shutdown);

    loop {
        let message = select! {
            biased;
            _ = &mut shutdown => {
                debug!("closing websocket for shutdown");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            message = socket.recv() => message,
        };

        let payload = match message {
            None | Some(Ok(Message::Close(_))) => {
                debug!("peer closed the websocket");
                break;
            }
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
        };

        let reply = respond_to(executor, &payload).await;
        send_reply(&mut socket, &reply).await?;
    }

    Ok(())
}

async fn send_reply(socket: &mut WebSocket, reply: &Reply) -> Result<(), TransportError> {
    socket.send(Message::Text(reply.to_json())).await?;
    Ok(())
}
