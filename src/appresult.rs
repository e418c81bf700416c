use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// `Json` whose rejections come back in the usual `{error}` body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Room is empty.")]
    RoomEmpty,

    #[error("Don't have any messages left.")]
    NoMoreMessages,

    #[error("{0}")]
    Validation(String),

    #[error("You need to be logged in.")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_is_empty: Option<bool>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        };

        let error = match &self {
            AppError::Internal(err) => {
                tracing::error!("request failed: {err:#}");
                "Something went wrong.".to_owned()
            }
            other => {
                tracing::debug!("request rejected: {other}");
                other.to_string()
            }
        };

        let body = ErrorBody {
            error,
            room_is_empty: matches!(self, AppError::RoomEmpty).then_some(true),
        };

        (status, Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self::Validation(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self::Validation(err.to_owned())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(time::error::ComponentRange);

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn room_empty_carries_flag() {
        let response = AppError::RoomEmpty.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Room is empty.");
        assert_eq!(body["roomIsEmpty"], true);
    }

    #[tokio::test]
    async fn other_errors_have_no_flag() {
        let body = body_json(AppError::NoMoreMessages.into_response()).await;
        assert_eq!(body["error"], "Don't have any messages left.");
        assert!(body.get("roomIsEmpty").is_none());
    }

    #[tokio::test]
    async fn internal_errors_are_opaque() {
        let err = AppError::from(anyhow::anyhow!("disk I/O error"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Something went wrong.");
    }

    #[tokio::test]
    async fn unauthorized_is_401() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
