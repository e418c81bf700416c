use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::OffsetDateTime;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    username        TEXT NOT NULL UNIQUE,
    email           TEXT NOT NULL DEFAULT '',
    profile_picture TEXT NOT NULL DEFAULT '',
    account         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rooms (
    name         TEXT PRIMARY KEY,
    is_private   INTEGER NOT NULL,
    private_pair TEXT UNIQUE
);

CREATE TABLE IF NOT EXISTS room_members (
    room_name TEXT NOT NULL REFERENCES rooms(name),
    user_id   TEXT NOT NULL,
    PRIMARY KEY (room_name, user_id)
);

CREATE TABLE IF NOT EXISTS messages (
    seq       INTEGER PRIMARY KEY AUTOINCREMENT,
    room_name TEXT NOT NULL REFERENCES rooms(name),
    sender_id TEXT NOT NULL,
    content   TEXT NOT NULL,
    pictures  TEXT NOT NULL DEFAULT '[]',
    sent_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_by_room ON messages (room_name, seq);

CREATE TABLE IF NOT EXISTS seen_by (
    message_seq INTEGER NOT NULL REFERENCES messages(seq),
    user_id     TEXT NOT NULL,
    seen_at     INTEGER NOT NULL,
    PRIMARY KEY (message_seq, user_id)
);
"#;

pub async fn connect(url: &str) -> sqlx::Result<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(url)
        .await?;

    sqlx::raw_sql(SCHEMA).execute(&db_pool).await?;
    Ok(db_pool)
}

/// Single-connection in-memory database; every connection to `sqlite::memory:`
/// is its own database, so the pool must never open a second one.
pub async fn memory_pool() -> sqlx::Result<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::raw_sql(SCHEMA).execute(&db_pool).await?;
    Ok(db_pool)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AccountType {
    Hirer,
    Freelancer {
        #[serde(rename = "hourlyWage")]
        hourly_wage: u32,
    },
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub profile_picture: String,
    pub account: AccountType,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Room {
    pub name: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeenBy {
    pub user_id: String,
    pub time: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub seq: i64,
    pub sender_id: String,
    pub content: String,
    pub pictures: Vec<String>,
    pub sent: OffsetDateTime,
    pub seen_by: Vec<SeenBy>,
}
