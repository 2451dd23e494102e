//! Read-only statistics for the admin surface.
//!
//! Identity counts come straight from the user tables. Everything about
//! posts, comments and likes goes through [`ContentActivity`], which may be
//! absent; the matching fields are then left out rather than reported as 0.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::content::PostView;
use crate::db::models::{User, USER_COLUMNS};
use crate::db::{like_pattern, timestamp};
use crate::error::{AppError, AppResult};
use crate::pagination::{Page, PageRequest};
use crate::state::DbPool;

/// Trailing window for the `recent_*` counts.
pub const RECENT_WINDOW_DAYS: i64 = 7;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentTotals {
    pub total_posts: i64,
    pub total_comments: i64,
    pub total_likes: i64,
    pub recent_posts: i64,
    pub recent_comments: i64,
    pub recent_likes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorActivity {
    pub post_count: i64,
    pub comment_count: i64,
    pub likes_received: i64,
}

/// Counts over post-side data, provided by whichever store owns it.
pub trait ContentActivity: Send + Sync {
    /// Totals, plus the rows created at or after `since`.
    fn totals(&self, since: DateTime<Utc>) -> AppResult<ContentTotals>;

    fn author_activity(&self, user_id: &str) -> AppResult<AuthorActivity>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_users: i64,
    pub recent_users: i64,
    #[serde(flatten)]
    pub content: Option<ContentTotals>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub user_id: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub account_age_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_count: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AdminUserRow {
    pub user: User,
    pub post_count: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AdminUserDetail {
    pub user: User,
    pub follower_count: i64,
    pub following_count: i64,
    pub activity: Option<AuthorActivity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminPostRow {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub content_preview: String,
    pub has_image: bool,
    pub is_active: bool,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<PostView> for AdminPostRow {
    fn from(view: PostView) -> Self {
        AdminPostRow {
            content_preview: preview(view.post.content.as_deref().unwrap_or_default()),
            has_image: view.post.image.is_some(),
            id: view.post.id,
            user_id: view.post.user_id,
            user_name: view.author_name,
            is_active: view.post.is_active,
            like_count: view.like_count,
            comment_count: view.comment_count,
            created_at: view.post.created_at,
        }
    }
}

/// First 100 characters, with `...` appended when anything was cut.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Clone)]
pub struct Reporter {
    pool: DbPool,
    content: Option<Arc<dyn ContentActivity>>,
}

impl Reporter {
    pub fn new(pool: DbPool, content: Option<Arc<dyn ContentActivity>>) -> Self {
        Self { pool, content }
    }

    pub fn dashboard(&self, now: DateTime<Utc>) -> AppResult<DashboardStats> {
        let since = now - Duration::days(RECENT_WINDOW_DAYS);
        let conn = self.pool.get()?;
        let (total_users, active_users, recent_users) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(is_active), 0),
                    COALESCE(SUM(date_joined >= ?1), 0)
             FROM users",
            params![timestamp(&since)],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;

        let content = self
            .content
            .as_ref()
            .map(|c| c.totals(since))
            .transpose()?;

        Ok(DashboardStats {
            total_users,
            active_users,
            recent_users,
            content,
        })
    }

    pub fn user_stats(&self, user: &User, now: DateTime<Utc>) -> AppResult<UserStats> {
        let (follower_count, following_count) = self.follow_counts(&user.id)?;
        let post_count = self
            .content
            .as_ref()
            .map(|c| c.author_activity(&user.id).map(|a| a.post_count))
            .transpose()?;

        Ok(UserStats {
            user_id: user.id.clone(),
            follower_count,
            following_count,
            account_age_days: (now - user.date_joined).num_days(),
            post_count,
        })
    }

    /// Every user, newest first, optionally filtered by name or email.
    pub fn admin_users(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> AppResult<Page<AdminUserRow>> {
        let conn = self.pool.get()?;
        let pattern = search.map(like_pattern);
        let filter = "?1 IS NULL OR fold(name) LIKE ?1 ESCAPE '\\' OR fold(email) LIKE ?1 ESCAPE '\\'";

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users WHERE {filter}"),
            params![pattern],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {filter}
             ORDER BY date_joined DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let users = stmt
            .query_map(params![pattern, page.limit(), page.offset()], User::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let rows = users
            .into_iter()
            .map(|user| {
                let post_count = self
                    .content
                    .as_ref()
                    .map(|c| c.author_activity(&user.id).map(|a| a.post_count))
                    .transpose()?;
                Ok(AdminUserRow { user, post_count })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Page::new(rows, total, page))
    }

    pub fn admin_user_detail(&self, user_id: &str) -> AppResult<AdminUserDetail> {
        let user = {
            let conn = self.pool.get()?;
            crate::accounts::fetch_user(&conn, user_id)?
        };
        let (follower_count, following_count) = self.follow_counts(user_id)?;
        let activity = self
            .content
            .as_ref()
            .map(|c| c.author_activity(user_id))
            .transpose()?;

        Ok(AdminUserDetail {
            user,
            follower_count,
            following_count,
            activity,
        })
    }

    fn follow_counts(&self, user_id: &str) -> AppResult<(i64, i64)> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT (SELECT COUNT(*) FROM follows WHERE followed_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE follower_id = ?1)",
            params![user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(AppError::from)
    }
}
