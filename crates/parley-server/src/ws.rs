//! Per-user event stream.
//!
//! A client opens `GET /ws` with its actor header and receives every
//! envelope published on its private channel as one JSON text frame.
//! Nothing the client sends is interpreted; it only keeps the socket alive.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};
use parley_shared::types::UserId;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::auth::Actor;

pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(Actor(user)): Extension<Actor>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_events(socket, state, user))
}

async fn stream_events(socket: WebSocket, state: AppState, user: UserId) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut events = state.hub.subscribe(user);
    info!(user = %user, "event stream opened");

    loop {
        tokio::select! {
            envelope = events.recv() => {
                let Some(envelope) = envelope else { break };
                let text = match envelope.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(user = %user, error = %e, "failed to encode envelope");
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Ping(data))) => {
                    if ws_sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(user = %user, error = %e, "websocket receive error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    // Dropping the receiver lets the hub prune this subscriber.
    drop(events);
    info!(user = %user, "event stream closed");
}
