//! JSON bodies. Storage paths leave the server only as public URLs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::accounts::{FollowView, ProfileSummary};
use crate::content::PostView;
use crate::db::models::{Comment, User};
use crate::media::MediaStorage;
use crate::reporting::{AdminUserDetail, AdminUserRow, AuthorActivity};

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub id: String,
    pub email: String,
    pub name: String,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserBody {
    pub fn new(user: &User, media: &dyn MediaStorage) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            bio: user.bio.clone(),
            profile_picture_url: user.profile_picture.as_deref().map(|p| media.url(p)),
            is_active: user.is_active,
            is_staff: user.is_staff,
            date_joined: user.date_joined,
            last_login: user.last_login,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileBody {
    #[serde(flatten)]
    pub user: UserBody,
    pub follower_count: i64,
    pub following_count: i64,
    pub is_following: bool,
}

impl ProfileBody {
    pub fn new(summary: &ProfileSummary, media: &dyn MediaStorage) -> Self {
        Self {
            user: UserBody::new(&summary.user, media),
            follower_count: summary.follower_count,
            following_count: summary.following_count,
            is_following: summary.is_following,
        }
    }
}

/// Lightweight user card for lists and suggestions.
#[derive(Debug, Serialize)]
pub struct UserCard {
    pub id: String,
    pub name: String,
    pub profile_picture_url: Option<String>,
}

impl UserCard {
    pub fn new(user: &User, media: &dyn MediaStorage) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            profile_picture_url: user.profile_picture.as_deref().map(|p| media.url(p)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FollowBody {
    #[serde(flatten)]
    pub user: UserCard,
    pub email: String,
    pub followed_at: DateTime<Utc>,
}

impl FollowBody {
    pub fn new(view: &FollowView, media: &dyn MediaStorage) -> Self {
        Self {
            user: UserCard::new(&view.user, media),
            email: view.user.email.clone(),
            followed_at: view.followed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostBody {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_profile_picture_url: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

impl PostBody {
    pub fn new(view: PostView, media: &dyn MediaStorage) -> Self {
        let post = view.post;
        Self {
            image_url: post.image.as_deref().map(|p| media.url(p)),
            user_profile_picture_url: view.author_picture.as_deref().map(|p| media.url(p)),
            id: post.id,
            user_id: post.user_id,
            user_name: view.author_name,
            content: post.content,
            is_active: post.is_active,
            created_at: post.created_at,
            updated_at: post.updated_at,
            like_count: view.like_count,
            comment_count: view.comment_count,
            is_liked: view.is_liked,
            comments: None,
        }
    }

    pub fn with_comments(mut self, comments: Vec<Comment>) -> Self {
        self.comments = Some(comments);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct AdminUserBody {
    #[serde(flatten)]
    pub user: UserBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_count: Option<i64>,
}

impl AdminUserBody {
    pub fn new(row: &AdminUserRow, media: &dyn MediaStorage) -> Self {
        Self {
            user: UserBody::new(&row.user, media),
            post_count: row.post_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminUserDetailBody {
    #[serde(flatten)]
    pub user: UserBody,
    pub follower_count: i64,
    pub following_count: i64,
    #[serde(flatten)]
    pub activity: Option<AuthorActivity>,
}

impl AdminUserDetailBody {
    pub fn new(detail: &AdminUserDetail, media: &dyn MediaStorage) -> Self {
        Self {
            user: UserBody::new(&detail.user, media),
            follower_count: detail.follower_count,
            following_count: detail.following_count,
            activity: detail.activity,
        }
    }
}
