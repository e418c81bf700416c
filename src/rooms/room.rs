use std::{ops::Range, sync::Arc};

use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::{OffsetDateTime, UtcOffset};

use crate::{session::Requester, AppError, AppJson, AppResult, AppState, Config};

use super::{msg::{self, HydratedMessage}, receipts, resolve};

/// Index range of page `page` (1 = newest) over `total` messages, oldest first.
///
/// A window that runs past the oldest message is clamped to 0 as long as the
/// overrun is at most one page; anything further is `NoMoreMessages`.
pub(crate) fn page_window(total: usize, page: usize, page_size: usize) -> AppResult<Range<usize>> {
    if page == 0 || page_size == 0 {
        return Err("Page must be at least 1.".into());
    }

    let shown = (page - 1).saturating_mul(page_size);
    let wanted = page.saturating_mul(page_size);

    if wanted > total {
        if wanted - total > page_size {
            return Err(AppError::NoMoreMessages);
        }
        return Ok(0..total - shown);
    }

    Ok(total - wanted..total - shown)
}

/// Resolves the room, records the requester's receipts and returns one page.
pub(crate) async fn load_page(
    db_pool: &SqlitePool,
    requester: &str,
    room: Option<&str>,
    chatting_with: Option<&str>,
    page: usize,
    page_size: usize,
    offset: UtcOffset,
) -> AppResult<Vec<HydratedMessage>> {
    let Some(room) = resolve::resolve(db_pool, requester, room, chatting_with).await? else {
        return Err(AppError::RoomEmpty);
    };

    if room.is_private && !resolve::is_member(db_pool, &room.name, requester).await? {
        tracing::warn!(room = %room.name, requester, "non-member tried to load private room");
        return Err(AppError::RoomEmpty);
    }

    receipts::mark_room_seen(db_pool, &room.name, requester, OffsetDateTime::now_utc()).await?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE room_name=?")
        .bind(&room.name)
        .fetch_one(db_pool)
        .await?;

    let window = page_window(total as usize, page, page_size)?;
    let messages = msg::load_messages(db_pool, &room.name, window.start, window.end).await?;
    msg::hydrate_all(db_pool, messages, offset).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoadRoomQuery {
    room: Option<String>,
    chatting_with: Option<String>,
    #[serde(default = "first_page")]
    page: usize,
}

fn first_page() -> usize {
    1
}

#[derive(Serialize)]
pub(crate) struct LoadRoomResponse {
    messages: Vec<HydratedMessage>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn load_room(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    Requester(user_id): Requester,
    AppJson(LoadRoomQuery { room, chatting_with, page }): AppJson<LoadRoomQuery>,
) -> AppResult<Json<LoadRoomResponse>> {
    let messages = load_page(
        &db_pool,
        &user_id,
        room.as_deref(),
        chatting_with.as_deref(),
        page,
        config.page_size,
        config.local_offset,
    )
    .await?;

    Ok(Json(LoadRoomResponse { messages }))
}
