use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{db::AccountType, rooms::like_pattern, session::Requester, AppJson, AppResult};

#[derive(Deserialize)]
pub(crate) struct FindUsersQuery {
    #[serde(default)]
    username: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FoundUser {
    user_id: String,
    username: String,
    profile_picture: String,
    account_type: AccountType,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FindUsersResponse {
    users: Vec<FoundUser>,
    not_found: bool,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn find_users(
    State(db_pool): State<SqlitePool>,
    _requester: Requester,
    AppJson(FindUsersQuery { username }): AppJson<FindUsersQuery>,
) -> AppResult<Json<FindUsersResponse>> {
    let users = search(&db_pool, &username).await?;
    let not_found = users.is_empty();
    Ok(Json(FindUsersResponse { users, not_found }))
}

async fn search(db_pool: &SqlitePool, username: &str) -> AppResult<Vec<FoundUser>> {
    if username.trim().is_empty() {
        return Err("Username is required".into());
    }

    let rows: Vec<(String, String, String, String)> = sqlx::query_as(
        r"SELECT id,username,profile_picture,account FROM users WHERE username LIKE ? ESCAPE '\' LIMIT 50",
    )
    .bind(like_pattern(username))
    .fetch_all(db_pool)
    .await?;

    let mut users = Vec::new();
    for (user_id, found, profile_picture, account) in rows {
        // LIKE ignores case; only exact-case substring hits are returned
        if !found.contains(username) {
            continue;
        }
        users.push(FoundUser {
            user_id,
            username: found,
            profile_picture,
            account_type: serde_json::from_str(&account)?,
        });
    }

    Ok(users)
}
