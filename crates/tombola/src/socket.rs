// Tombola
// Copyright (C) 2025 Throneless Tech

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{ConnectInfo, State},
    response::IntoResponse,
};
use serde::Serialize;
use std::net::SocketAddr;
use tombola_common::{
    error::{Result, TombolaErrorKind},
    socket::{Response, SocketMessage},
};
use tracing::{debug, error};

use crate::api::{self, ApiState};
use crate::channels::UserHandle;

pub async fn handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(mut socket: WebSocket, who: SocketAddr, state: ApiState) {
    while let Some(msg) = socket.recv().await {
        let msg = if let Ok(msg) = msg {
            match process_message(msg, who, &state).await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    debug!("Websocket closed");
                    return;
                }
                Err(err) => {
                    error!("Error parsing message from {who}: {}", err);
                    return;
                }
            }
        } else {
            error!("Client {who} abruptly disconnected");
            return;
        };

        if socket.send(msg).await.is_err() {
            error!("Client {who} abruptly disconnected");
            return;
        }
    }
}

fn wrap_error<S: Serialize>(response_type: &str, res: &S) -> Result<Option<Message>> {
    Ok(Some(Message::Text(
        serde_json::to_string(&SocketMessage::Error(Response {
            response_type: response_type.to_owned(),
            response: res,
        }))?
        .into(),
    )))
}

fn wrap_response<S: Serialize>(response_type: &str, res: &S) -> Result<Option<Message>> {
    Ok(Some(Message::Text(
        serde_json::to_string(&SocketMessage::Response(Response {
            response_type: response_type.to_owned(),
            response: res,
        }))?
        .into(),
    )))
}

async fn process_message(
    msg: Message,
    who: SocketAddr,
    state: &ApiState,
) -> Result<Option<Message>> {
    match msg {
        Message::Text(t) => {
            debug!(">>> {who} sent str: {t:?}");
            let contents: SocketMessage<String> = match serde_json::from_slice(t.as_bytes()) {
                Ok(contents) => contents,
                Err(err) => return wrap_error("SocketMessage", &err.to_string()),
            };
            match contents {
                SocketMessage::StartGiveaway {
                    guild_id,
                    channel_id,
                    prize,
                    duration_minutes,
                    winner_count,
                } => match api::start_giveaway(
                    &guild_id,
                    &channel_id,
                    &prize,
                    duration_minutes,
                    winner_count,
                    state,
                )
                .await
                {
                    Ok(res) => wrap_response("StartGiveaway", &res),
                    Err(err) => wrap_error("StartGiveaway", &err.to_string()),
                },
                SocketMessage::CancelGiveaway { id } => {
                    match api::cancel_giveaway(&id, state).await {
                        Ok(res) => wrap_response("CancelGiveaway", &res),
                        Err(err) => wrap_error("CancelGiveaway", &err.to_string()),
                    }
                }
                SocketMessage::RerollGiveaway { id } => {
                    match api::reroll_giveaway(&id, state).await {
                        Ok(res) => wrap_response("RerollGiveaway", &res),
                        Err(err) => wrap_error("RerollGiveaway", &err.to_string()),
                    }
                }
                SocketMessage::ListGiveaways { guild_id } => {
                    match api::list_giveaways(&guild_id, state).await {
                        Ok(res) => wrap_response("ListGiveaways", &res),
                        Err(err) => wrap_error("ListGiveaways", &err.to_string()),
                    }
                }
                SocketMessage::ReactionAdded {
                    guild_id,
                    message_id,
                    user_id,
                    emoji,
                    bot,
                } => {
                    let user = UserHandle { id: user_id, bot };
                    match api::record_reaction(&guild_id, &message_id, user, &emoji, state).await {
                        Ok(res) => wrap_response("ReactionAdded", &res),
                        Err(err) => wrap_error("ReactionAdded", &err.to_string()),
                    }
                }
                _ => Ok(wrap_error(
                    "SocketMessage",
                    &"Invalid SocketMessage".to_owned(),
                )?),
            }
        }
        Message::Binary(d) => {
            debug!(">>> {} sent {} bytes: {:?}", who, d.len(), d);
            Ok(wrap_error(
                "BinaryFrame",
                &"Server doesn't accept binary frames".to_owned(),
            )?)
        }
        Message::Close(c) => {
            if let Some(cf) = c {
                debug!(
                    ">>> {} sent close with code {} and reason `{}`",
                    who, cf.code, cf.reason
                );
                match cf.code {
                    1000 => Ok(None), // 1000 is code for "Normal"
                    _ => Err(TombolaErrorKind::WebsocketClose.into()),
                }
            } else {
                debug!(">>> {who} somehow sent close message without CloseFrame");
                Err(TombolaErrorKind::WebsocketClose.into())
            }
        }

        Message::Pong(v) => {
            debug!(">>> {who} sent pong with {v:?}");
            Ok(Some(Message::Text(
                serde_json::to_string("Pong received")?.into(),
            )))
        }
        Message::Ping(v) => {
            debug!(">>> {who} sent ping with {v:?}");
            Ok(Some(Message::Text(
                serde_json::to_string("Ping received")?.into(),
            )))
        }
    }
}
