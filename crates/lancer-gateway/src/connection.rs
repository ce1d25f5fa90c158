use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use lancer_types::events::{GatewayCommand, GatewayEvent, PresenceStatus};

use crate::dispatcher::Dispatcher;
use crate::fanout::FanoutError;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The JWT was already
/// validated at the HTTP upgrade layer, so an invalid token never reaches
/// registration.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Send existing online users to this client so they see who's already
    // here without polling
    let existing_users = dispatcher.online_users().await;
    for (uid, uname) in &existing_users {
        let event = GatewayEvent::UserStatusChanged {
            user_id: *uid,
            username: uname.clone(),
            status: PresenceStatus::Online,
        };
        if sender
            .send(Message::Text(serde_json::to_string(&event).unwrap().into()))
            .await
            .is_err()
        {
            return;
        }
    }

    // Register, go online, broadcast
    let (conn_id, mut user_rx) = dispatcher.connect(user_id, username.clone()).await;

    let dispatcher_clone = dispatcher.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
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
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_clone, user_id, &username_recv, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            log_excerpt(&text, 200)
                        );
                        dispatcher_clone
                            .send_error(user_id, format!("malformed command: {}", e))
                            .await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

/// At most `max` bytes of `text`, cut on a char boundary so a multi-byte
/// character straddling the limit can't panic the slice.
fn log_excerpt(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn handle_command(
    dispatcher: &Dispatcher,
    user_id: Uuid,
    username: &str,
    cmd: GatewayCommand,
) {
    let result = match cmd {
        GatewayCommand::SendMessage { chat_id, text } => {
            dispatcher
                .send_message(user_id, username, chat_id, text)
                .await
        }
        GatewayCommand::SendFile {
            chat_id,
            filename,
            content_type,
            size,
            data,
        } => {
            info!(
                "{} ({}) sending file '{}' ({} bytes) to chat {}",
                username, user_id, filename, size, chat_id
            );
            dispatcher
                .send_file(user_id, username, chat_id, filename, content_type, size, data)
                .await
        }
    };

    if let Err(e) = result {
        if let FanoutError::Storage(cause) = &e {
            error!("{} ({}) send failed in store: {:#}", username, user_id, cause);
        }
        dispatcher.send_error(user_id, e.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_excerpt_never_splits_a_character() {
        // A euro sign straddling the byte limit must not panic the slice
        let mut frame = "a".repeat(199);
        frame.push('€');
        let excerpt = log_excerpt(&frame, 200);
        assert_eq!(excerpt, "a".repeat(199));

        assert_eq!(log_excerpt("short", 200), "short");
        assert_eq!(log_excerpt("€€€", 4), "€");
    }
}
