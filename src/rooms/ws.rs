use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{ws::Message, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{session::Requester, AppError, AppResult, Config};

use super::{msg::{self, RoomEvent, SendMessageQuery}, resolve};

/// Frame for a subscriber of `watched`, or `None` for other rooms' events.
fn feed_frame(event: &RoomEvent, watched: &str) -> Option<Message> {
    if event.room != watched {
        return None;
    }
    serde_json::to_string(event).ok().map(|json| Message::Text(json.into()))
}

#[derive(Deserialize)]
pub(crate) struct RoomWsQuery {
    room: String,
}

/// Live feed of one room. Text frames from the client are sent to that room.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Query(RoomWsQuery { room }): Query<RoomWsQuery>,
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    State(tx): State<broadcast::Sender<RoomEvent>>,
    Requester(user_id): Requester,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(room) = resolve::find_by_name(&db_pool, &room).await? else {
        return Err(AppError::RoomEmpty);
    };

    if room.is_private && !resolve::is_member(&db_pool, &room.name, &user_id).await? {
        return Err(AppError::RoomEmpty);
    }

    let offset = config.local_offset;
    Ok(ws.on_upgrade(async move |stream| {
        let mut rx = tx.subscribe();
        let (mut sender, mut receiver) = stream.split();

        let watched = room.name.clone();
        let broadcast_task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(room = %watched, skipped, "live feed lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(frame) = feed_frame(&event, &watched) else {
                    continue;
                };
                if sender.send(frame).await.is_err() {
                    break;
                }
            }
        });

        while let Some(Ok(frame)) = receiver.next().await {
            let Message::Text(text) = frame else {
                continue;
            };
            let Ok(mut query) = serde_json::from_str::<SendMessageQuery>(&text) else {
                tracing::debug!(user_id = %user_id, "dropping malformed frame");
                continue;
            };
            query.room = Some(room.name.clone());
            query.chatting_with = None;

            if let Err(err) = msg::send_msg(&db_pool, &tx, &user_id, query, offset).await {
                tracing::warn!(room = %room.name, user_id = %user_id, "send over websocket failed: {err}");
            }
        }

        broadcast_task.abort();
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::msg::{HydratedMessage, Sender};

    fn event(room: &str, content: &str) -> RoomEvent {
        RoomEvent {
            room: room.to_owned(),
            message: HydratedMessage {
                sent: "09:30".to_owned(),
                sender: Sender { user_id: "u1".to_owned(), username: "alice_w".to_owned() },
                content: content.to_owned(),
                pictures: Vec::new(),
                profile_picture: String::new(),
                seen_by: Vec::new(),
            },
        }
    }

    #[test]
    fn forwards_only_the_watched_room() {
        assert!(feed_frame(&event("welding", "sparks"), "lobby").is_none());
        // prefix of the watched name is still another room
        assert!(feed_frame(&event("lobby 2", "hi"), "lobby").is_none());

        let Some(Message::Text(text)) = feed_frame(&event("lobby", "hello"), "lobby") else {
            panic!("lobby event was not forwarded");
        };
        let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(json["room"], "lobby");
        assert_eq!(json["message"]["content"], "hello");
        assert_eq!(json["message"]["sender"]["username"], "alice_w");
    }
}
