use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::{OffsetDateTime, UtcOffset};

use crate::{session::Requester, users, AppJson, AppResult, AppState, Config};

use super::{like_pattern, msg::{format_sent, Sender}};

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct RoomName {
    name: String,
}

#[derive(Deserialize)]
pub(crate) struct LoadRoomsQuery {
    page: Option<u32>,
    amount: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoadRoomsResponse {
    rooms: Vec<RoomName>,
    loaded_all: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn load_rooms(
    State(db_pool): State<SqlitePool>,
    _requester: Requester,
    AppJson(LoadRoomsQuery { page, amount }): AppJson<LoadRoomsQuery>,
) -> AppResult<Json<LoadRoomsResponse>> {
    let (Some(page @ 1..), Some(amount @ 1..)) = (page, amount) else {
        return Err("You need to specify the page and the amount.".into());
    };

    let (rooms, loaded_all) = public_rooms(&db_pool, page, amount).await?;
    Ok(Json(LoadRoomsResponse { rooms, loaded_all }))
}

/// One page of public rooms by name; `loaded_all` once this page reaches the last room.
async fn public_rooms(db_pool: &SqlitePool, page: u32, amount: u32) -> AppResult<(Vec<RoomName>, bool)> {
    let skip = i64::from(page - 1) * i64::from(amount);

    let names: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM rooms WHERE is_private=0 ORDER BY name LIMIT ? OFFSET ?")
            .bind(i64::from(amount))
            .bind(skip)
            .fetch_all(db_pool)
            .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms WHERE is_private=0")
        .fetch_one(db_pool)
        .await?;

    let loaded_all = skip + names.len() as i64 >= total;
    let rooms = names.into_iter().map(|(name,)| RoomName { name }).collect();
    Ok((rooms, loaded_all))
}

#[derive(Deserialize)]
pub(crate) struct FindRoomQuery {
    #[serde(default)]
    room: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FindRoomResponse {
    rooms: Vec<RoomName>,
    not_found: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn find_room(
    State(db_pool): State<SqlitePool>,
    _requester: Requester,
    AppJson(FindRoomQuery { room }): AppJson<FindRoomQuery>,
) -> AppResult<Json<FindRoomResponse>> {
    let rooms = search_public(&db_pool, &room).await?;
    let not_found = rooms.is_empty();
    Ok(Json(FindRoomResponse { rooms, not_found }))
}

async fn search_public(db_pool: &SqlitePool, query: &str) -> AppResult<Vec<RoomName>> {
    if query.trim().is_empty() {
        return Err("You need to specify a room.".into());
    }

    let names: Vec<(String,)> = sqlx::query_as(
        r"SELECT name FROM rooms WHERE is_private=0 AND name LIKE ? ESCAPE '\' ORDER BY name LIMIT 20",
    )
    .bind(like_pattern(query))
    .fetch_all(db_pool)
    .await?;

    Ok(names
        .into_iter()
        .filter(|(name,)| name.contains(query))
        .map(|(name,)| RoomName { name })
        .collect())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LastMessage {
    sender: Sender,
    content: String,
    sent: String,
    seen_by: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoomMember {
    user_id: String,
    username: String,
    profile_picture: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PrivateRoom {
    name: String,
    last_message: Option<LastMessage>,
    users: Vec<RoomMember>,
}

#[derive(Serialize)]
pub(crate) struct PrivateRoomsResponse {
    rooms: Vec<PrivateRoom>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn load_private_rooms(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    Requester(user_id): Requester,
) -> AppResult<Json<PrivateRoomsResponse>> {
    let rooms = private_rooms(&db_pool, &user_id, config.private_rooms_limit, config.local_offset).await?;
    Ok(Json(PrivateRoomsResponse { rooms }))
}

async fn private_rooms(
    db_pool: &SqlitePool,
    user_id: &str,
    limit: i64,
    offset: UtcOffset,
) -> AppResult<Vec<PrivateRoom>> {
    // most recently active first; rooms without messages sort last
    let names: Vec<(String,)> = sqlx::query_as(
        "SELECT r.name FROM rooms r
         JOIN room_members m ON m.room_name=r.name
         WHERE m.user_id=? AND r.is_private=1
         ORDER BY (SELECT MAX(seq) FROM messages WHERE room_name=r.name) DESC NULLS LAST, r.name
         LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db_pool)
    .await?;

    try_join_all(names.into_iter().map(|(name,)| private_room(db_pool, name, offset))).await
}

async fn private_room(db_pool: &SqlitePool, name: String, offset: UtcOffset) -> AppResult<PrivateRoom> {
    let member_ids: Vec<(String,)> =
        sqlx::query_as("SELECT user_id FROM room_members WHERE room_name=? ORDER BY rowid")
            .bind(&name)
            .fetch_all(db_pool)
            .await?;

    let users = try_join_all(member_ids.into_iter().map(|(user_id,)| async move {
        let profile = users::profile(db_pool, &user_id).await?;
        AppResult::Ok(RoomMember {
            user_id,
            username: profile.username,
            profile_picture: profile.profile_picture,
        })
    }))
    .await?;

    let last: Option<(i64, String, String, i64)> = sqlx::query_as(
        "SELECT seq,sender_id,content,sent_at FROM messages WHERE room_name=? ORDER BY seq DESC LIMIT 1",
    )
    .bind(&name)
    .fetch_optional(db_pool)
    .await?;

    let last_message = match last {
        Some((seq, sender_id, content, sent_at)) => {
            let seen_by: Vec<(String,)> =
                sqlx::query_as("SELECT user_id FROM seen_by WHERE message_seq=? ORDER BY rowid")
                    .bind(seq)
                    .fetch_all(db_pool)
                    .await?;
            let sender = users::profile(db_pool, &sender_id).await?;

            Some(LastMessage {
                sender: Sender { user_id: sender_id, username: sender.username },
                content,
                sent: format_sent(OffsetDateTime::from_unix_timestamp(sent_at)?, offset),
                seen_by: seen_by.into_iter().map(|(user_id,)| user_id).collect(),
            })
        }
        None => None,
    };

    Ok(PrivateRoom { name, last_message, users })
}
