//! Development identity: puts a user id into the session without passwords.
//! Only mounted when `DEV_LOGIN` is set; production sits behind a real login.

mod login;
mod logout;
mod signup;

use axum::{routing::post, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
        .route("/signup", post(signup::signup))
}
