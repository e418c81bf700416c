use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::AppResult;

/// Marks every message in `room` as seen by `user_id`.
///
/// A single `INSERT OR IGNORE` keyed on (message, user): existing receipts
/// keep their original time and concurrent loads can't drop each other's rows.
pub(crate) async fn mark_room_seen(
    db_pool: &SqlitePool,
    room: &str,
    user_id: &str,
    now: OffsetDateTime,
) -> AppResult<u64> {
    let added = sqlx::query(
        "INSERT OR IGNORE INTO seen_by (message_seq,user_id,seen_at)
         SELECT seq,?,? FROM messages WHERE room_name=?",
    )
    .bind(user_id)
    .bind(now.unix_timestamp())
    .bind(room)
    .execute(db_pool)
    .await?
    .rows_affected();

    tracing::debug!(room, user_id, added, "merged read receipts");
    Ok(added)
}

pub(crate) async fn mark_message_seen(
    db_pool: &SqlitePool,
    seq: i64,
    user_id: &str,
    now: OffsetDateTime,
) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO seen_by (message_seq,user_id,seen_at) VALUES (?,?,?)")
        .bind(seq)
        .bind(user_id)
        .bind(now.unix_timestamp())
        .execute(db_pool)
        .await?;
    Ok(())
}
