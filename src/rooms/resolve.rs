use sqlx::SqlitePool;

use crate::{db::Room, users, AppResult};

use super::private_room_name;

/// Finds the room a request refers to.
///
/// Private rooms are keyed by both participant ids, and callers don't agree
/// on their order, so both orderings are tried before `room`. The pair
/// names only match private rooms.
pub(crate) async fn resolve(
    db_pool: &SqlitePool,
    requester: &str,
    room: Option<&str>,
    chatting_with: Option<&str>,
) -> AppResult<Option<Room>> {
    if let Some(other) = chatting_with.filter(|s| !s.is_empty()) {
        for name in [private_room_name(requester, other), private_room_name(other, requester)] {
            if let Some(found) = find_private(db_pool, &name).await? {
                return Ok(Some(found));
            }
        }
    }

    match room.filter(|s| !s.is_empty()) {
        Some(room) => find_by_name(db_pool, room).await,
        None => Ok(None),
    }
}

async fn find_private(db_pool: &SqlitePool, name: &str) -> AppResult<Option<Room>> {
    Ok(sqlx::query_as::<_, Room>("SELECT name,is_private FROM rooms WHERE name=? AND is_private=1")
        .bind(name)
        .fetch_optional(db_pool)
        .await?)
}

/// Whether `name` is spelled like the private room of two existing users.
pub(crate) async fn names_a_pair(db_pool: &SqlitePool, name: &str) -> AppResult<bool> {
    let Some((first, second)) = name.split_once(' ') else {
        return Ok(false);
    };
    if first.is_empty() || second.is_empty() || second.contains(' ') {
        return Ok(false);
    }
    Ok(users::exists(db_pool, first).await? && users::exists(db_pool, second).await?)
}

pub(crate) async fn find_by_name(db_pool: &SqlitePool, name: &str) -> AppResult<Option<Room>> {
    Ok(sqlx::query_as::<_, Room>("SELECT name,is_private FROM rooms WHERE name=?")
        .bind(name)
        .fetch_optional(db_pool)
        .await?)
}

pub(crate) async fn is_member(db_pool: &SqlitePool, room: &str, user_id: &str) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM room_members WHERE room_name=? AND user_id=?")
        .bind(room)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, users::tests::seed};

    async fn insert_room(db_pool: &SqlitePool, name: &str, is_private: bool) {
        sqlx::query("INSERT INTO rooms (name,is_private) VALUES (?,?)")
            .bind(name)
            .bind(is_private)
            .execute(db_pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finds_reversed_private_name() {
        let db_pool = db::memory_pool().await.unwrap();
        insert_room(&db_pool, "B A", true).await;

        let room = resolve(&db_pool, "A", Some("A B"), Some("B")).await.unwrap().unwrap();
        assert_eq!(room.name, "B A");
    }

    #[tokio::test]
    async fn both_orderings_converge() {
        let db_pool = db::memory_pool().await.unwrap();
        insert_room(&db_pool, "u1 u2", true).await;

        let from_u1 = resolve(&db_pool, "u1", None, Some("u2")).await.unwrap();
        let from_u2 = resolve(&db_pool, "u2", None, Some("u1")).await.unwrap();
        assert_eq!(from_u1, from_u2);
        assert_eq!(from_u1.unwrap().name, "u1 u2");
    }

    #[tokio::test]
    async fn private_name_wins_over_provided_name() {
        let db_pool = db::memory_pool().await.unwrap();
        insert_room(&db_pool, "lobby", false).await;
        insert_room(&db_pool, "u1 u2", true).await;

        let room = resolve(&db_pool, "u2", Some("lobby"), Some("u1")).await.unwrap().unwrap();
        assert_eq!(room.name, "u1 u2");
    }

    #[tokio::test]
    async fn falls_back_to_provided_name() {
        let db_pool = db::memory_pool().await.unwrap();
        insert_room(&db_pool, "lobby", false).await;

        let room = resolve(&db_pool, "u1", Some("lobby"), Some("u9")).await.unwrap().unwrap();
        assert_eq!(room, Room { name: "lobby".to_owned(), is_private: false });
    }

    #[tokio::test]
    async fn pair_names_skip_public_rooms() {
        let db_pool = db::memory_pool().await.unwrap();
        insert_room(&db_pool, "u1 u2", false).await;

        assert!(resolve(&db_pool, "u1", None, Some("u2")).await.unwrap().is_none());
        // the same name given as a plain room still resolves
        let room = resolve(&db_pool, "u1", Some("u1 u2"), None).await.unwrap().unwrap();
        assert!(!room.is_private);
    }

    #[tokio::test]
    async fn recognises_pair_names_of_real_users() {
        let db_pool = db::memory_pool().await.unwrap();
        let alice = seed(&db_pool, "alice_w").await;
        let bruno = seed(&db_pool, "bruno_k").await;

        let pair = format!("{} {}", bruno.id, alice.id);
        assert!(names_a_pair(&db_pool, &pair).await.unwrap());
        assert!(!names_a_pair(&db_pool, &format!("{} ghost", alice.id)).await.unwrap());
        assert!(!names_a_pair(&db_pool, "web design").await.unwrap());
        assert!(!names_a_pair(&db_pool, "lobby").await.unwrap());
    }

    #[tokio::test]
    async fn missing_everywhere_is_none() {
        let db_pool = db::memory_pool().await.unwrap();
        assert!(resolve(&db_pool, "u1", Some("nowhere"), Some("u2")).await.unwrap().is_none());
        assert!(resolve(&db_pool, "u1", None, None).await.unwrap().is_none());
    }
}
