use std::{collections::HashMap, sync::Arc};

use axum::{debug_handler, extract::State, Json};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::broadcast;

use crate::{
    db::{Message, Room, SeenBy},
    session::Requester,
    users, AppError, AppJson, AppResult, AppState, Config,
};

use super::{private_pair, private_room_name, receipts, resolve};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeenByView {
    pub user_id: String,
    pub username: String,
    pub profile_picture: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HydratedMessage {
    pub sent: String,
    pub sender: Sender,
    pub content: String,
    pub pictures: Vec<String>,
    pub profile_picture: String,
    pub seen_by: Vec<SeenByView>,
}

/// Broadcast to live subscribers whenever a message is stored.
#[derive(Debug, Clone, Serialize)]
pub struct RoomEvent {
    pub room: String,
    pub message: HydratedMessage,
}

/// Zero-padded 24h `HH:MM` on the server clock.
pub(crate) fn format_sent(sent: OffsetDateTime, offset: UtcOffset) -> String {
    let local = sent.to_offset(offset);
    format!("{:02}:{:02}", local.hour(), local.minute())
}

/// Loads messages `[start, end)` of `room`, oldest first, with their receipts.
pub(crate) async fn load_messages(
    db_pool: &SqlitePool,
    room: &str,
    start: usize,
    end: usize,
) -> AppResult<Vec<Message>> {
    if start >= end {
        return Ok(Vec::new());
    }

    let rows: Vec<(i64, String, String, String, i64)> = sqlx::query_as(
        "SELECT seq,sender_id,content,pictures,sent_at FROM messages
         WHERE room_name=? ORDER BY seq LIMIT ? OFFSET ?",
    )
    .bind(room)
    .bind((end - start) as i64)
    .bind(start as i64)
    .fetch_all(db_pool)
    .await?;

    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Ok(Vec::new());
    };

    let receipts: Vec<(i64, String, i64)> = sqlx::query_as(
        "SELECT s.message_seq,s.user_id,s.seen_at FROM seen_by s
         JOIN messages m ON m.seq=s.message_seq
         WHERE m.room_name=? AND s.message_seq BETWEEN ? AND ?
         ORDER BY s.rowid",
    )
    .bind(room)
    .bind(first.0)
    .bind(last.0)
    .fetch_all(db_pool)
    .await?;

    let mut seen: HashMap<i64, Vec<SeenBy>> = HashMap::new();
    for (seq, user_id, seen_at) in receipts {
        seen.entry(seq).or_default().push(SeenBy {
            user_id,
            time: OffsetDateTime::from_unix_timestamp(seen_at)?,
        });
    }

    let mut messages = Vec::with_capacity(rows.len());
    for (seq, sender_id, content, pictures, sent_at) in rows {
        messages.push(Message {
            seq,
            sender_id,
            content,
            pictures: serde_json::from_str(&pictures)?,
            sent: OffsetDateTime::from_unix_timestamp(sent_at)?,
            seen_by: seen.remove(&seq).unwrap_or_default(),
        });
    }

    Ok(messages)
}

pub(crate) async fn hydrate(
    db_pool: &SqlitePool,
    message: Message,
    offset: UtcOffset,
) -> AppResult<HydratedMessage> {
    let sender = users::profile(db_pool, &message.sender_id).await?;

    let seen_by = try_join_all(message.seen_by.into_iter().map(|entry| async move {
        let profile = users::profile(db_pool, &entry.user_id).await?;
        Ok::<_, AppError>(SeenByView {
            user_id: entry.user_id,
            username: profile.username,
            profile_picture: profile.profile_picture,
        })
    }))
    .await?;

    Ok(HydratedMessage {
        sent: format_sent(message.sent, offset),
        sender: Sender {
            user_id: message.sender_id,
            username: sender.username,
        },
        content: message.content,
        pictures: message.pictures,
        profile_picture: sender.profile_picture,
        seen_by,
    })
}

pub(crate) async fn hydrate_all(
    db_pool: &SqlitePool,
    messages: Vec<Message>,
    offset: UtcOffset,
) -> AppResult<Vec<HydratedMessage>> {
    try_join_all(messages.into_iter().map(|message| hydrate(db_pool, message, offset))).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageQuery {
    pub(crate) room: Option<String>,
    pub(crate) chatting_with: Option<String>,
    #[serde(default)]
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) pictures: Vec<String>,
}

#[derive(Serialize)]
pub(crate) struct SendMessageResponse {
    message: HydratedMessage,
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_message(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    State(tx): State<broadcast::Sender<RoomEvent>>,
    Requester(user_id): Requester,
    AppJson(query): AppJson<SendMessageQuery>,
) -> AppResult<Json<SendMessageResponse>> {
    let message = send_msg(&db_pool, &tx, &user_id, query, config.local_offset).await?;
    Ok(Json(SendMessageResponse { message }))
}

pub(crate) async fn send_msg(
    db_pool: &SqlitePool,
    tx: &broadcast::Sender<RoomEvent>,

    sender_id: &str,
    SendMessageQuery { room, chatting_with, content, pictures }: SendMessageQuery,

    offset: UtcOffset,
) -> AppResult<HydratedMessage> {
    if content.trim().is_empty() && pictures.is_empty() {
        return Err("A message needs content or pictures.".into());
    }

    let room = match resolve::resolve(db_pool, sender_id, room.as_deref(), chatting_with.as_deref()).await? {
        Some(room) => room,
        None => create_room(db_pool, sender_id, room.as_deref(), chatting_with.as_deref()).await?,
    };

    if room.is_private && !resolve::is_member(db_pool, &room.name, sender_id).await? {
        return Err(AppError::RoomEmpty);
    }

    sqlx::query("INSERT OR IGNORE INTO room_members (room_name,user_id) VALUES (?,?)")
        .bind(&room.name)
        .bind(sender_id)
        .execute(db_pool)
        .await?;

    let now = OffsetDateTime::now_utc();
    let seq = sqlx::query(
        "INSERT INTO messages (room_name,sender_id,content,pictures,sent_at) VALUES (?,?,?,?,?)",
    )
    .bind(&room.name)
    .bind(sender_id)
    .bind(&content)
    .bind(serde_json::to_string(&pictures)?)
    .bind(now.unix_timestamp())
    .execute(db_pool)
    .await?
    .last_insert_rowid();

    receipts::mark_message_seen(db_pool, seq, sender_id, now).await?;

    let message = Message {
        seq,
        sender_id: sender_id.to_owned(),
        content,
        pictures,
        sent: now,
        seen_by: vec![SeenBy { user_id: sender_id.to_owned(), time: now }],
    };
    let message = hydrate(db_pool, message, offset).await?;

    tracing::debug!(room = %room.name, sender_id, seq, "message stored");
    // nobody listening is fine
    let _ = tx.send(RoomEvent { room: room.name, message: message.clone() });

    Ok(message)
}

/// Creates the room on first send.
///
/// Private rooms carry an order-independent pair key, so if both users
/// send their first message at once the second insert is ignored and the
/// lookup below lands on the winner.
async fn create_room(
    db_pool: &SqlitePool,
    sender_id: &str,
    room: Option<&str>,
    chatting_with: Option<&str>,
) -> AppResult<Room> {
    if let Some(other) = chatting_with.filter(|s| !s.is_empty()) {
        if other == sender_id {
            return Err("You can't chat with yourself.".into());
        }
        if !users::exists(db_pool, other).await? {
            return Err("User not found".into());
        }

        let name = private_room_name(sender_id, other);
        sqlx::query("INSERT OR IGNORE INTO rooms (name,is_private,private_pair) VALUES (?,1,?)")
            .bind(&name)
            .bind(private_pair(sender_id, other))
            .execute(db_pool)
            .await?;

        let room = resolve::resolve(db_pool, sender_id, None, Some(other))
            .await?
            .ok_or_else(|| anyhow::anyhow!("private room {name} vanished after insert"))?;

        for member in [sender_id, other] {
            sqlx::query("INSERT OR IGNORE INTO room_members (room_name,user_id) VALUES (?,?)")
                .bind(&room.name)
                .bind(member)
                .execute(db_pool)
                .await?;
        }

        tracing::info!(room = %room.name, "created private room");
        return Ok(room);
    }

    let Some(name) = room.filter(|s| !s.trim().is_empty()) else {
        return Err("You need to specify a room or a user to chat with.".into());
    };
    if resolve::names_a_pair(db_pool, name).await? {
        return Err("That room name is reserved.".into());
    }

    sqlx::query("INSERT OR IGNORE INTO rooms (name,is_private) VALUES (?,0)")
        .bind(name)
        .execute(db_pool)
        .await?;

    tracing::info!(room = name, "created public room");
    resolve::find_by_name(db_pool, name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("room {name} vanished after insert").into())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{db, users::tests::seed};

    pub(crate) fn query(room: Option<&str>, chatting_with: Option<&str>, content: &str) -> SendMessageQuery {
        SendMessageQuery {
            room: room.map(str::to_owned),
            chatting_with: chatting_with.map(str::to_owned),
            content: content.to_owned(),
            pictures: Vec::new(),
        }
    }

    #[test]
    fn sent_time_is_zero_padded() {
        let sent = OffsetDateTime::from_unix_timestamp(3 * 3600 + 7 * 60).unwrap();
        assert_eq!(format_sent(sent, UtcOffset::UTC), "03:07");

        let offset = UtcOffset::from_hms(2, 0, 0).unwrap();
        assert_eq!(format_sent(sent, offset), "05:07");

        let late = OffsetDateTime::from_unix_timestamp(23 * 3600 + 59 * 60).unwrap();
        assert_eq!(format_sent(late, UtcOffset::UTC), "23:59");
    }

    #[tokio::test]
    async fn first_send_creates_one_private_room_for_both_sides() {
        let db_pool = db::memory_pool().await.unwrap();
        let (tx, _) = broadcast::channel(8);
        let alice = seed(&db_pool, "alice_w").await;
        let bruno = seed(&db_pool, "bruno_k").await;

        send_msg(&db_pool, &tx, &alice.id, query(None, Some(bruno.id.as_str()), "hi"), UtcOffset::UTC).await.unwrap();
        send_msg(&db_pool, &tx, &bruno.id, query(None, Some(alice.id.as_str()), "hey"), UtcOffset::UTC).await.unwrap();

        let rooms: Vec<(String,)> = sqlx::query_as("SELECT name FROM rooms").fetch_all(&db_pool).await.unwrap();
        assert_eq!(rooms, [(private_room_name(&alice.id, &bruno.id),)]);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages").fetch_one(&db_pool).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn reversed_pair_insert_is_ignored() {
        let db_pool = db::memory_pool().await.unwrap();
        let alice = seed(&db_pool, "alice_w").await;
        let bruno = seed(&db_pool, "bruno_k").await;

        create_room(&db_pool, &alice.id, None, Some(bruno.id.as_str())).await.unwrap();
        // a stale resolve on the other side still converges
        let room = create_room(&db_pool, &bruno.id, None, Some(alice.id.as_str())).await.unwrap();
        assert_eq!(room.name, private_room_name(&alice.id, &bruno.id));
    }

    #[tokio::test]
    async fn sent_message_is_hydrated_and_broadcast() {
        let db_pool = db::memory_pool().await.unwrap();
        let (tx, mut rx) = broadcast::channel(8);
        let alice = seed(&db_pool, "alice_w").await;

        let message = send_msg(&db_pool, &tx, &alice.id, query(Some("lobby"), None, "hello"), UtcOffset::UTC)
            .await
            .unwrap();
        assert_eq!(message.sender.username, "alice_w");
        assert_eq!(message.profile_picture, "alice_w.png");
        assert_eq!(message.seen_by.len(), 1);
        assert_eq!(message.seen_by[0].user_id, alice.id);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.room, "lobby");
        assert_eq!(event.message, message);
    }

    #[tokio::test]
    async fn public_room_cannot_take_a_pair_name() {
        let db_pool = db::memory_pool().await.unwrap();
        let (tx, _) = broadcast::channel(8);
        let alice = seed(&db_pool, "alice_w").await;
        let bruno = seed(&db_pool, "bruno_k").await;
        let mallory = seed(&db_pool, "mallory").await;

        let name = private_room_name(&alice.id, &bruno.id);
        let squat = send_msg(&db_pool, &tx, &mallory.id, query(Some(name.as_str()), None, "squat"), UtcOffset::UTC).await;
        assert!(matches!(squat, Err(AppError::Validation(_))));

        send_msg(&db_pool, &tx, &alice.id, query(None, Some(bruno.id.as_str()), "my secret"), UtcOffset::UTC)
            .await
            .unwrap();
        let room = resolve::find_by_name(&db_pool, &name).await.unwrap().unwrap();
        assert!(room.is_private);

        let intrude = send_msg(&db_pool, &tx, &mallory.id, query(Some(name.as_str()), None, "hi"), UtcOffset::UTC).await;
        assert!(matches!(intrude, Err(AppError::RoomEmpty)));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let db_pool = db::memory_pool().await.unwrap();
        let (tx, _) = broadcast::channel(8);
        let result = send_msg(&db_pool, &tx, "u1", query(Some("lobby"), None, "   "), UtcOffset::UTC).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_counterpart_is_rejected() {
        let db_pool = db::memory_pool().await.unwrap();
        let (tx, _) = broadcast::channel(8);
        let alice = seed(&db_pool, "alice_w").await;
        let result = send_msg(&db_pool, &tx, &alice.id, query(None, Some("ghost"), "hi"), UtcOffset::UTC).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
