mod find;

use axum::{routing::post, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::{AccountType, User}, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/findUsers", post(find::find_users))
}

/// Display metadata attached to messages and room listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub username: String,
    pub profile_picture: String,
}

/// Unknown users render with an empty profile rather than failing the request.
pub(crate) async fn profile(db_pool: &SqlitePool, user_id: &str) -> AppResult<Profile> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT username,profile_picture FROM users WHERE id=?")
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?;

    Ok(match row {
        Some((username, profile_picture)) => Profile { username, profile_picture },
        None => {
            tracing::debug!(user_id, "profile lookup missed");
            Profile::default()
        }
    })
}

pub(crate) async fn exists(db_pool: &SqlitePool, user_id: &str) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM users WHERE id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

pub(crate) async fn find_by_username(db_pool: &SqlitePool, username: &str) -> AppResult<Option<User>> {
    let row: Option<(String, String, String, String, String)> =
        sqlx::query_as("SELECT id,username,email,profile_picture,account FROM users WHERE username=?")
            .bind(username)
            .fetch_optional(db_pool)
            .await?;

    let Some((id, username, email, profile_picture, account)) = row else {
        return Ok(None);
    };

    Ok(Some(User {
        id,
        username,
        email,
        profile_picture,
        account: serde_json::from_str(&account)?,
    }))
}

pub async fn create_user(
    db_pool: &SqlitePool,
    username: &str,
    email: &str,
    profile_picture: &str,
    account: AccountType,
) -> AppResult<User> {
    if username.chars().count() <= 4 {
        return Err("Username must be at least 5 characters long.".into());
    }

    if find_by_username(db_pool, username).await?.is_some() {
        return Err("Username is already taken".into());
    }

    let id = Uuid::now_v7().to_string();
    tracing::info!("adding @{username}#{id}");
    sqlx::query("INSERT INTO users (id,username,email,profile_picture,account) VALUES (?,?,?,?,?)")
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(profile_picture)
        .bind(serde_json::to_string(&account)?)
        .execute(db_pool)
        .await?;

    Ok(User {
        id,
        username: username.to_owned(),
        email: email.to_owned(),
        profile_picture: profile_picture.to_owned(),
        account,
    })
}
