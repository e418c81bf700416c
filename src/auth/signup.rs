use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{db::AccountType, session::USER_ID, users, AppJson, AppResult};

use super::login::LoginResponse;

const DEFAULT_HOURLY_WAGE: u32 = 15;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignupQuery {
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    profile_picture: String,
    #[serde(default)]
    freelancer: bool,
    hourly_wage: Option<u32>,
}

impl SignupQuery {
    fn account(&self) -> AccountType {
        if !self.freelancer {
            return AccountType::Hirer;
        }
        AccountType::Freelancer {
            hourly_wage: self.hourly_wage.filter(|&w| w > 0).unwrap_or(DEFAULT_HOURLY_WAGE),
        }
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn signup(
    State(db_pool): State<SqlitePool>,
    session: Session,
    AppJson(query): AppJson<SignupQuery>,
) -> AppResult<Json<LoginResponse>> {
    let user = users::create_user(
        &db_pool,
        &query.username,
        &query.email,
        &query.profile_picture,
        query.account(),
    )
    .await?;

    session.cycle_id().await?;
    session.insert(USER_ID, &user.id).await?;
    Ok(Json(LoginResponse { user_id: user.id }))
}
