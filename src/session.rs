use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::AppError;

pub const USER_ID: &str = "user_id";

/// The verified id of the user making the request.
#[derive(Debug, Clone)]
pub struct Requester(pub String);

impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| {
                tracing::error!("session layer missing: {msg}");
                AppError::Unauthorized
            })?;

        match session.get::<String>(USER_ID).await? {
            Some(user_id) => Ok(Requester(user_id)),
            None => Err(AppError::Unauthorized),
        }
    }
}
