use chrono::{Duration, Utc};
use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::db::models::{qualified, User, USER_COLUMNS};
use crate::db::timestamp;
use crate::error::AppResult;
use crate::state::DbPool;

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: &str, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();
    let now = Utc::now();
    let expires_at = now + Duration::hours(hours as i64);

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, token, timestamp(&now), timestamp(&expires_at)],
    )?;

    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// The active user behind an unexpired session token.
pub fn user_for_token(pool: &DbPool, token: &str) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    let columns = qualified(USER_COLUMNS, "u");
    let user = conn
        .query_row(
            &format!(
                "SELECT {columns} FROM sessions s
                 JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1 AND s.expires_at > ?2 AND u.is_active = 1"
            ),
            params![token, timestamp(&Utc::now())],
            User::from_row,
        )
        .optional()?;
    Ok(user)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
