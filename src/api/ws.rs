//! Change-event socket.
//!
//! Clients connect with their token in the query string, register with
//! the broadcast hub under their username and receive the serialized
//! events the hub addresses to them. Incoming client messages are
//! ignored.

use crate::error::VfsError;
use crate::utils::jwt;
use crate::utils::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

/// GET /ws?token=<jwt>
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, VfsError> {
    let user = jwt::decode(&state.config.jwt_secret, &query.token)?.into_user();
    Ok(ws.on_upgrade(move |socket| handle_socket(state, user.username, socket)))
}

async fn handle_socket(state: Arc<AppState>, username: String, socket: WebSocket) {
    let mut info = HashMap::new();
    info.insert("username".to_string(), username.clone());

    let (id, mut rx) = state.broadcaster.register(info).await;
    let clients = state.broadcaster.client_count().await;
    tracing::debug!(%username, clients, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    state.broadcaster.unregister(id).await;
    tracing::debug!(%username, "websocket closed");
}
