mod list;
pub mod msg;
mod receipts;
mod resolve;
mod room;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use msg::{HydratedMessage, RoomEvent};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/loadRoom", post(room::load_room))
        .route("/loadRooms", post(list::load_rooms))
        .route("/findRoom", post(list::find_room))
        .route("/loadPrivateRooms", post(list::load_private_rooms))
        .route("/sendMessage", post(msg::send_message))
        .route("/ws", get(ws::room_ws))
}

/// Name of the private room between two users, as `"{first} {second}"`.
pub fn private_room_name(first: &str, second: &str) -> String {
    format!("{first} {second}")
}

/// Order-independent key shared by both spellings of a private room name.
pub(crate) fn private_pair(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a} {b}")
    } else {
        format!("{b} {a}")
    }
}

/// `%needle%` for `LIKE ... ESCAPE '\'`, with wildcards in `needle` escaped.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_ignores_order() {
        assert_eq!(private_pair("b", "a"), private_pair("a", "b"));
        assert_ne!(private_room_name("b", "a"), private_room_name("a", "b"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("web"), "%web%");
        assert_eq!(like_pattern(r"50%_\"), r"%50\%\_\\%");
    }
}
