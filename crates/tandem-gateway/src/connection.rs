use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tandem_types::events::ClientCommand;

use crate::coordinator::Relay;
use crate::hub::ConnId;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Longest slice of a rejected frame that is logged.
const MAX_LOGGED_FRAME: usize = 200;

/// Drive one WebSocket connection until either side closes it.
///
/// Commands from this connection are handled one at a time in arrival
/// order. Pushes for this connection arrive through the hub and are
/// written by a separate task, so a slow command never blocks them.
pub async fn handle_connection(socket: WebSocket, relay: Relay) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut events) = relay.connect().await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward pushes -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode {} for {}: {}", event.name(), conn_id, e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout on {} (missed {} pongs), dropping connection", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let stop = CancellationToken::new();
    let mut recv_task = tokio::spawn(read_commands(
        receiver,
        relay.clone(),
        conn_id,
        pong_flag_recv,
        stop.clone(),
    ));

    // A command in flight finishes before teardown
    tokio::select! {
        _ = &mut send_task => {
            stop.cancel();
            if let Err(e) = (&mut recv_task).await {
                warn!("Command reader for {} failed: {}", conn_id, e);
            }
        }
        _ = &mut recv_task => send_task.abort(),
    }

    relay.disconnect(conn_id).await;
}

/// Parse and handle inbound frames until the stream ends, the client closes
/// or `stop` fires. `stop` is only checked between frames.
async fn read_commands<S, E>(
    mut receiver: S,
    relay: Relay,
    conn_id: ConnId,
    pong_received: Arc<AtomicBool>,
    stop: CancellationToken,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => break,
            frame = receiver.next() => frame,
        };
        let Some(Ok(msg)) = frame else { break };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(cmd) => {
                    debug!("{} -> {:?}", conn_id, cmd);
                    relay.handle_command(conn_id, cmd).await;
                }
                Err(e) => {
                    let raw: String = text.chars().take(MAX_LOGGED_FRAME).collect();
                    warn!("{} bad command: {} -- raw: {}", conn_id, e, raw);
                }
            },
            Message::Pong(_) => {
                pong_received.store(true, Ordering::Release);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use futures_util::stream;
    use tandem_db::Database;
    use tandem_types::events::{SendMessage, ServerEvent};
    use tandem_types::{RoomId, UserId};

    fn frame(cmd: &ClientCommand) -> Result<Message, Infallible> {
        Ok(Message::Text(serde_json::to_string(cmd).unwrap().into()))
    }

    #[tokio::test]
    async fn stop_lets_the_command_in_flight_finish() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_chat_room("R").unwrap();
        db.create_chat("R", "A", "B").unwrap();
        let relay = Relay::new(db);

        let (conn, mut rx) = relay.connect().await;
        relay.handle_command(conn, ClientCommand::RegisterUser(UserId::from("A"))).await;
        relay.handle_command(conn, ClientCommand::JoinRoom(RoomId::from("R"))).await;

        // Stop the reader as soon as the echo reaches the sender's queue,
        // the same moment a failed socket write would end the writer.
        let stop = CancellationToken::new();
        let stop_on_echo = stop.clone();
        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(event, ServerEvent::ReceiveMessage(_)) {
                    stop_on_echo.cancel();
                    break;
                }
            }
        });

        let send = ClientCommand::SendMessage(SendMessage {
            room_id: Some("R".into()),
            content: Some("hi".into()),
            image_urls: vec![],
            user_id: Some("A".into()),
            kind: Some("text".into()),
        });
        let frames = stream::iter(vec![frame(&send)]).chain(stream::pending());

        tokio::time::timeout(
            Duration::from_secs(2),
            read_commands(frames, relay.clone(), conn, Arc::new(AtomicBool::new(true)), stop),
        )
        .await
        .expect("reader did not stop");
        writer.await.unwrap();

        let pending = relay.store().chat_notifications(&UserId::from("B")).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn close_frame_ends_the_reader() {
        let relay = Relay::new(Arc::new(Database::open_in_memory().unwrap()));
        let (conn, _rx) = relay.connect().await;
        let frames = stream::iter(vec![
            Ok::<_, Infallible>(Message::Close(None)),
            frame(&ClientCommand::RegisterUser(UserId::from("late"))),
        ]);

        let pong = Arc::new(AtomicBool::new(true));
        read_commands(frames, relay.clone(), conn, pong, CancellationToken::new()).await;
        assert_eq!(relay.registry().lookup(&UserId::from("late")).await, None);
    }
}
