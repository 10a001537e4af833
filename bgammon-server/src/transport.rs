//! Transport adapters: TCP (newline-framed) and WebSocket (one command per
//! message). Both present the same shape described in §4.4 -- drain inbound
//! frames into the session's commands channel, flush outbound frames from
//! its events channel, and stop on peer close or `ClientSession::terminate`
//! -- as a single task per connection rather than a split reader/writer
//! pair, which sidesteps `Notify`'s single-waiter wakeup in favor of one
//! consumer per session.

use crate::client::ClientSession;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{trace, warn};
use warp::ws::{Message, WebSocket};

/// Greeting written once to a freshly accepted TCP connection, before
/// anything else -- the WebSocket transport has no equivalent, since the
/// upgrade handshake itself serves that purpose.
pub const TCP_HELLO: &str = "hello\n";

/// Drives a single TCP connection until the peer disconnects or the
/// session is terminated. Frames are newline-terminated UTF-8 text.
pub async fn run_tcp(stream: TcpStream, session: Arc<ClientSession>) {
    let _ = stream.set_nodelay(true);
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    if writer.write_all(TCP_HELLO.as_bytes()).await.is_err() {
        session.terminate("");
        return;
    }

    let mut events = session.take_events_receiver();
    let commands = session.commands_sender();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        session.touch_active();
                        if commands.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(client = %session.id, %err, "tcp read error");
                        break;
                    }
                }
            }
            frame = events.recv() => {
                match frame {
                    Some(frame) => {
                        if writer.write_all(frame.as_bytes()).await.is_err()
                            || writer.write_all(b"\n").await.is_err()
                        {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = session.wait_for_terminate() => {
                if let Some(reason) = session.terminate_reason() {
                    let _ = writer.write_all(reason.as_bytes()).await;
                    let _ = writer.write_all(b"\n").await;
                }
                let _ = writer.shutdown().await;
                break;
            }
        }
    }

    session.terminate("");
    trace!(client = %session.id, "tcp transport task exiting");
}

/// Drives a single upgraded WebSocket connection. One command per text
/// frame; binary frames are ignored.
pub async fn run_websocket(ws: WebSocket, session: Arc<ClientSession>) {
    let (mut sink, mut stream) = ws.split();
    let mut events = session.take_events_receiver();
    let commands = session.commands_sender();

    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(Ok(message)) => {
                        if message.is_close() {
                            break;
                        }
                        if let Ok(text) = message.to_str() {
                            session.touch_active();
                            if commands.send(text.to_string()).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!(client = %session.id, %err, "websocket read error");
                        break;
                    }
                    None => break,
                }
            }
            frame = events.recv() => {
                match frame {
                    Some(frame) => {
                        if sink.send(Message::text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = session.wait_for_terminate() => {
                if let Some(reason) = session.terminate_reason() {
                    let _ = sink.send(Message::text(reason)).await;
                }
                let _ = sink.close().await;
                break;
            }
        }
    }

    session.terminate("");
    trace!(client = %session.id, "websocket transport task exiting");
}
