use chrono::Utc;
use rusqlite::params;
use serde::Serialize;

use super::{fetch_visible_post, ContentStore};
use crate::db::{immediate, timestamp};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeToggle {
    pub liked: bool,
    pub like_count: i64,
}

impl ContentStore {
    /// Like the post if the user hasn't, unlike it otherwise.
    ///
    /// A racing like from the same user hits the `(post_id, user_id)` unique
    /// key and is treated as already liked.
    pub fn toggle_like(&self, post_id: &str, user_id: &str) -> AppResult<LikeToggle> {
        let conn = self.pool.get()?;
        let toggle = immediate(&conn, |tx| {
            fetch_visible_post(tx, post_id)?;

            let removed = tx.execute(
                "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id, user_id],
            )?;
            let liked = removed == 0;
            if liked {
                tx.execute(
                    "INSERT INTO likes (id, post_id, user_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (post_id, user_id) DO NOTHING",
                    params![
                        uuid::Uuid::now_v7().to_string(),
                        post_id,
                        user_id,
                        timestamp(&Utc::now())
                    ],
                )?;
            }

            let like_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
                params![post_id],
                |r| r.get(0),
            )?;
            Ok::<_, AppError>(LikeToggle { liked, like_count })
        })?;

        tracing::debug!(
            "{} {} post {}",
            user_id,
            if toggle.liked { "liked" } else { "unliked" },
            post_id
        );
        Ok(toggle)
    }
}
