use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::Serialize;

use crate::db::{optional_time_column, time_column};

/// Column list matching [`User::from_row`].
pub const USER_COLUMNS: &str = "id, email, name, password_hash, bio, profile_picture, \
     is_active, is_staff, is_superuser, date_joined, last_login, updated_at";

/// Prefix every column in a list such as [`USER_COLUMNS`] with a table alias.
pub fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub bio: Option<String>,
    /// Storage path of the profile image, owned by this row alone.
    pub profile_picture: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            password_hash: row.get(3)?,
            bio: row.get(4)?,
            profile_picture: row.get(5)?,
            is_active: row.get(6)?,
            is_staff: row.get(7)?,
            is_superuser: row.get(8)?,
            date_joined: time_column(row, 9)?,
            last_login: optional_time_column(row, 10)?,
            updated_at: time_column(row, 11)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowEdge {
    pub id: String,
    pub follower_id: String,
    pub followed_id: String,
    pub created_at: DateTime<Utc>,
}

/// Column list matching [`Post::from_row`].
pub const POST_COLUMNS: &str = "id, user_id, content, image, is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: Option<String>,
    /// Storage path of the attached image, owned by this row alone.
    pub image: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Post {
            id: row.get(0)?,
            user_id: row.get(1)?,
            content: row.get(2)?,
            image: row.get(3)?,
            is_active: row.get(4)?,
            created_at: time_column(row, 5)?,
            updated_at: time_column(row, 6)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
