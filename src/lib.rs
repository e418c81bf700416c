//! Chat backend of a freelance marketplace: public and private rooms,
//! reverse-paginated message history with read receipts, and a live feed.

mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod rooms;
pub mod session;
pub mod users;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    Router,
};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppJson, AppResult};
pub use config::Config;
pub use rooms::RoomEvent;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<Config>,
    pub tx: broadcast::Sender<RoomEvent>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        Self {
            db_pool,
            config: Arc::new(config),
            tx: broadcast::channel(256).0,
        }
    }
}

pub fn app(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            config.session_inactivity_minutes,
        )));

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    let mut router = Router::new()
        .merge(rooms::router())
        .nest("/user", users::router());

    if config.dev_login {
        tracing::warn!("DEV_LOGIN is on, passwordless login is exposed");
        router = router.merge(auth::router());
    }

    Ok(router
        .with_state(state)
        // message pictures travel inline
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
