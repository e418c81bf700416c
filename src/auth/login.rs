use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{session::USER_ID, users, AppJson, AppResult};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    #[serde(default)]
    username: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    pub(crate) user_id: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    AppJson(LoginQuery { username }): AppJson<LoginQuery>,
) -> AppResult<Json<LoginResponse>> {
    if username.is_empty() {
        return Err("Username is required.".into());
    }

    let Some(user) = users::find_by_username(&db_pool, &username).await? else {
        return Err("User not found".into());
    };

    session.cycle_id().await?;
    session.insert(USER_ID, &user.id).await?;
    tracing::info!(user_id = %user.id, "logged in @{username}");

    Ok(Json(LoginResponse { user_id: user.id }))
}
