use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{fetch_user, AccountStore};
use crate::db::models::{qualified, FollowEdge, User, USER_COLUMNS};
use crate::db::{immediate, is_unique_violation, time_column, timestamp};
use crate::error::{AppError, AppResult};
use crate::pagination::{Page, PageRequest};

/// Outcome of a follow toggle: the state the edge is in afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowToggle {
    pub is_following: bool,
    pub target_name: String,
}

/// A user on the other end of a follow edge, with when the edge was made.
#[derive(Debug, Clone)]
pub struct FollowView {
    pub user: User,
    pub followed_at: DateTime<Utc>,
}

#[derive(Clone, Copy)]
enum Side {
    Followers,
    Following,
}

impl AccountStore {
    /// Insert the edge `follower -> followed`. Fails with `Conflict` when it
    /// already exists.
    pub fn create_edge(&self, follower_id: &str, followed_id: &str) -> AppResult<FollowEdge> {
        let conn = self.pool.get()?;
        create_edge_in(&conn, follower_id, followed_id)
    }

    /// Remove the edge `follower -> followed`. Fails with `NotFound` when it
    /// is absent.
    pub fn delete_edge(&self, follower_id: &str, followed_id: &str) -> AppResult<()> {
        let conn = self.pool.get()?;
        delete_edge_in(&conn, follower_id, followed_id)
    }

    /// Flip the follow state between two users in one transaction. A
    /// concurrent follow that wins the race is absorbed as "now following".
    pub fn toggle_follow(&self, follower_id: &str, target_id: &str) -> AppResult<FollowToggle> {
        if follower_id == target_id {
            return Err(AppError::InvalidOperation(
                "You cannot follow yourself.".into(),
            ));
        }

        let conn = self.pool.get()?;
        immediate(&conn, |tx| {
            let target = fetch_user(tx, target_id)?;
            if !target.is_active {
                return Err(AppError::NotFound);
            }

            let is_following = if edge_exists(tx, follower_id, target_id)? {
                delete_edge_in(tx, follower_id, target_id)?;
                false
            } else {
                match create_edge_in(tx, follower_id, target_id) {
                    Ok(_) | Err(AppError::Conflict(_)) => true,
                    Err(e) => return Err(e),
                }
            };

            Ok(FollowToggle {
                is_following,
                target_name: target.name,
            })
        })
    }

    pub fn is_following(&self, follower_id: &str, followed_id: &str) -> AppResult<bool> {
        let conn = self.pool.get()?;
        Ok(edge_exists(&conn, follower_id, followed_id)?)
    }

    pub fn follower_count(&self, user_id: &str) -> AppResult<i64> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE followed_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?)
    }

    pub fn following_count(&self, user_id: &str) -> AppResult<i64> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?)
    }

    /// Users following `user_id`, most recent edge first.
    pub fn followers(&self, user_id: &str, page: PageRequest) -> AppResult<Page<FollowView>> {
        self.edge_page(user_id, Side::Followers, page)
    }

    /// Users `user_id` follows, most recent edge first.
    pub fn following(&self, user_id: &str, page: PageRequest) -> AppResult<Page<FollowView>> {
        self.edge_page(user_id, Side::Following, page)
    }

    fn edge_page(&self, user_id: &str, side: Side, page: PageRequest) -> AppResult<Page<FollowView>> {
        let conn = self.pool.get()?;
        fetch_user(&conn, user_id)?;

        let (anchor, other) = match side {
            Side::Followers => ("followed_id", "follower_id"),
            Side::Following => ("follower_id", "followed_id"),
        };
        let columns = qualified(USER_COLUMNS, "u");

        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM follows f JOIN users u ON u.id = f.{other}
                 WHERE f.{anchor} = ?1 AND u.is_active = 1"
            ),
            params![user_id],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {columns}, f.created_at FROM follows f
             JOIN users u ON u.id = f.{other}
             WHERE f.{anchor} = ?1 AND u.is_active = 1
             ORDER BY f.created_at DESC, f.id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let views = stmt
            .query_map(params![user_id, page.limit(), page.offset()], |row| {
                Ok(FollowView {
                    user: User::from_row(row)?,
                    followed_at: time_column(row, 12)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(views, total, page))
    }

    /// Up to `limit` random active users the viewer does not follow yet.
    pub fn suggestions(&self, viewer_id: &str, limit: u32) -> AppResult<Vec<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE is_active = 1 AND id <> ?1
               AND id NOT IN (SELECT followed_id FROM follows WHERE follower_id = ?1)
             ORDER BY RANDOM()
             LIMIT ?2"
        ))?;
        let users = stmt
            .query_map(params![viewer_id, limit], User::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

fn edge_exists(conn: &Connection, follower_id: &str, followed_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
        params![follower_id, followed_id],
        |r| r.get(0),
    )
}

pub(super) fn create_edge_in(
    conn: &Connection,
    follower_id: &str,
    followed_id: &str,
) -> AppResult<FollowEdge> {
    if follower_id == followed_id {
        return Err(AppError::InvalidOperation(
            "You cannot follow yourself.".into(),
        ));
    }

    let edge = FollowEdge {
        id: uuid::Uuid::now_v7().to_string(),
        follower_id: follower_id.to_string(),
        followed_id: followed_id.to_string(),
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO follows (id, follower_id, followed_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            edge.id,
            edge.follower_id,
            edge.followed_id,
            timestamp(&edge.created_at)
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Already following this user.".into())
        } else {
            e.into()
        }
    })?;

    tracing::debug!("{} now follows {}", follower_id, followed_id);
    Ok(edge)
}

pub(super) fn delete_edge_in(conn: &Connection, follower_id: &str, followed_id: &str) -> AppResult<()> {
    let removed = conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
        params![follower_id, followed_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    tracing::debug!("{} unfollowed {}", follower_id, followed_id);
    Ok(())
}
