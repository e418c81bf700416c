use std::{env, fmt::Display, str::FromStr};

use anyhow::Context;
use time::UtcOffset;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub cors_origin: String,
    pub page_size: usize,
    pub private_rooms_limit: i64,
    pub session_inactivity_minutes: i64,
    pub dev_login: bool,

    /// Server clock offset, used to render message times as `HH:MM`.
    pub local_offset: UtcOffset,
}

impl Config {
    /// Reads `.env` and the process environment.
    ///
    /// Must run before the async runtime spawns its workers, otherwise the
    /// local offset can't be determined and UTC is used instead.
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let local_offset = UtcOffset::current_local_offset().unwrap_or_else(|e| {
            warn!("Could not determine local offset ({e}), using UTC");
            UtcOffset::UTC
        });

        Ok(Self {
            database_url: try_load("DATABASE_URL", "sqlite://chat.db?mode=rwc")?,
            port: try_load("PORT", "8080")?,
            cors_origin: try_load("CORS_ORIGIN", "http://localhost:3000")?,
            page_size: try_load("PAGE_SIZE", "10")?,
            private_rooms_limit: try_load("PRIVATE_ROOMS_LIMIT", "10")?,
            session_inactivity_minutes: try_load("SESSION_INACTIVITY_MINUTES", "60")?,
            dev_login: try_load("DEV_LOGIN", "false")?,
            local_offset,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_owned(),
            port: 8080,
            cors_origin: "http://localhost:3000".to_owned(),
            page_size: 10,
            private_rooms_limit: 10,
            session_inactivity_minutes: 60,
            dev_login: false,
            local_offset: UtcOffset::UTC,
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default() {
        let port: u16 = try_load("GIGCHAT_TEST_UNSET_PORT", "8080").unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn rejects_malformed_default() {
        assert!(try_load::<u16>("GIGCHAT_TEST_UNSET_PORT", "eighty").is_err());
    }
}
