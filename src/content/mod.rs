//! Content store: posts, their comment threads and likes.

mod comments;
mod likes;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::accounts::DependentAssets;
use crate::db::models::{qualified, Post, User, POST_COLUMNS};
use crate::db::{immediate, like_pattern, timestamp};
use crate::error::{AppError, AppResult};
use crate::media::{AssetCleanup, ImageUpdate};
use crate::pagination::{Page, PageRequest};
use crate::reporting::{AuthorActivity, ContentActivity, ContentTotals};
use crate::state::DbPool;

pub use self::likes::LikeToggle;

pub const CONTENT_MAX_LEN: usize = 500;

/// Who is looking. Decides `is_liked` and whether moderated posts show up.
#[derive(Debug, Clone, Copy, Default)]
pub struct Viewer<'a> {
    pub id: Option<&'a str>,
    pub is_staff: bool,
}

impl<'a> Viewer<'a> {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user: &'a User) -> Self {
        Self {
            id: Some(&user.id),
            is_staff: user.is_staff,
        }
    }

    pub fn maybe(user: Option<&'a User>) -> Self {
        user.map(Self::user).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: String,
    pub content: Option<String>,
    pub image: Option<String>,
}

impl NewPost {
    /// Ids are minted before the insert so an image can be stored under
    /// the post's own directory first.
    pub fn next_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

/// `content: Some("")` clears the text.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub content: Option<String>,
    pub image: ImageUpdate,
}

/// A post joined with its author and derived counts.
#[derive(Debug, Clone)]
pub struct PostView {
    pub post: Post,
    pub author_name: String,
    pub author_picture: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
}

/// Select list for [`PostView::from_row`]. Binds the viewer id as `?1`.
pub(crate) fn post_view_select() -> String {
    format!(
        "SELECT {}, u.name, u.profile_picture,
                (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
                EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?1)
         FROM posts p
         JOIN users u ON u.id = p.user_id",
        qualified(POST_COLUMNS, "p")
    )
}

impl PostView {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(PostView {
            post: Post::from_row(row)?,
            author_name: row.get(7)?,
            author_picture: row.get(8)?,
            like_count: row.get(9)?,
            comment_count: row.get(10)?,
            is_liked: row.get(11)?,
        })
    }
}

#[derive(Clone)]
pub struct ContentStore {
    pool: DbPool,
}

impl ContentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn create_post(&self, author_id: &str, new: &NewPost) -> AppResult<Post> {
        let content = normalize_content(new.content.as_deref())?;
        if content.is_none() && new.image.is_none() {
            return Err(empty_post());
        }

        let conn = self.pool.get()?;
        let now = timestamp(&Utc::now());
        conn.execute(
            "INSERT INTO posts (id, user_id, content, image, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![new.id, author_id, content, new.image, now],
        )?;

        let post = fetch_post(&conn, &new.id)?;
        tracing::info!("Post {} created by {}", post.id, author_id);
        Ok(post)
    }

    pub fn get_post(&self, post_id: &str) -> AppResult<Post> {
        let conn = self.pool.get()?;
        fetch_post(&conn, post_id)
    }

    /// A single post as `viewer` sees it. Moderated posts exist only for staff.
    pub fn post_view(&self, viewer: Viewer<'_>, post_id: &str) -> AppResult<PostView> {
        let conn = self.pool.get()?;
        let view = conn
            .query_row(
                &format!("{} WHERE p.id = ?2", post_view_select()),
                params![viewer.id, post_id],
                PostView::from_row,
            )
            .optional()?
            .ok_or(AppError::NotFound)?;

        if !view.post.is_active && !viewer.is_staff {
            return Err(AppError::NotFound);
        }
        Ok(view)
    }

    /// Owner-only edit. A post must keep text or an image.
    pub fn update_post(
        &self,
        actor_id: &str,
        post_id: &str,
        update: &PostUpdate,
    ) -> AppResult<(Post, AssetCleanup)> {
        let content = update
            .content
            .as_deref()
            .map(|c| normalize_content(Some(c)))
            .transpose()?;

        let conn = self.pool.get()?;
        let (post, previous) = immediate(&conn, |tx| {
            let current = fetch_post(tx, post_id)?;
            if current.user_id != actor_id {
                return Err(AppError::Forbidden);
            }

            let previous = current.image.clone();
            let image = update.image.resolve(previous.as_deref());
            let content = content.clone().unwrap_or(current.content);
            if content.is_none() && image.is_none() {
                return Err(empty_post());
            }

            tx.execute(
                "UPDATE posts SET content = ?1, image = ?2, updated_at = ?3 WHERE id = ?4",
                params![content, image, timestamp(&Utc::now()), post_id],
            )?;
            Ok((fetch_post(tx, post_id)?, previous))
        })?;

        let cleanup = AssetCleanup::replaced(previous, post.image.as_deref());
        Ok((post, cleanup))
    }

    /// Delete a post with its comments and likes. Allowed for the author and
    /// for staff.
    pub fn delete_post(&self, actor: &User, post_id: &str) -> AppResult<AssetCleanup> {
        let conn = self.pool.get()?;
        let image = immediate(&conn, |tx| {
            let post = fetch_post(tx, post_id)?;
            if post.user_id != actor.id && !actor.is_staff {
                return Err(AppError::Forbidden);
            }
            tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
            Ok(post.image)
        })?;

        tracing::info!("Post {} deleted by {}", post_id, actor.id);
        Ok(AssetCleanup::released(image))
    }

    /// Moderation switch. Hidden posts drop out of every feed.
    pub fn set_post_active(&self, post_id: &str, active: bool) -> AppResult<Post> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE posts SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active, timestamp(&Utc::now()), post_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound);
        }
        tracing::info!(
            "Post {} {}",
            post_id,
            if active { "restored" } else { "hidden" }
        );
        fetch_post(&conn, post_id)
    }

    /// `(comment_count, like_count)`, read from the child rows every time.
    pub fn derive_counts(&self, post_id: &str) -> AppResult<(i64, i64)> {
        let conn = self.pool.get()?;
        fetch_post(&conn, post_id)?;
        Ok(conn.query_row(
            "SELECT (SELECT COUNT(*) FROM comments WHERE post_id = ?1),
                    (SELECT COUNT(*) FROM likes WHERE post_id = ?1)",
            params![post_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
    }

    /// Every post, moderated ones included, newest first. Matches content or
    /// author name.
    pub fn list_all(&self, search: Option<&str>, page: PageRequest) -> AppResult<Page<PostView>> {
        let conn = self.pool.get()?;
        let pattern = search.map(like_pattern);
        let matches = |n: u8| {
            format!("(?{n} IS NULL OR fold(p.content) LIKE ?{n} ESCAPE '\\' OR fold(u.name) LIKE ?{n} ESCAPE '\\')")
        };

        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM posts p JOIN users u ON u.id = p.user_id WHERE {}",
                matches(1)
            ),
            params![pattern],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE {}
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT ?3 OFFSET ?4",
            post_view_select(),
            matches(2)
        ))?;
        let views = stmt
            .query_map(
                params![Option::<&str>::None, pattern, page.limit(), page.offset()],
                PostView::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(views, total, page))
    }
}

impl DependentAssets for ContentStore {
    fn assets_owned_by(&self, conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT image FROM posts WHERE user_id = ?1 AND image IS NOT NULL")?;
        let images = stmt
            .query_map(params![user_id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(images)
    }
}

impl ContentActivity for ContentStore {
    fn totals(&self, since: DateTime<Utc>) -> AppResult<ContentTotals> {
        let conn = self.pool.get()?;
        let since = timestamp(&since);
        Ok(conn.query_row(
            "SELECT (SELECT COUNT(*) FROM posts),
                    (SELECT COUNT(*) FROM comments),
                    (SELECT COUNT(*) FROM likes),
                    (SELECT COUNT(*) FROM posts WHERE created_at >= ?1),
                    (SELECT COUNT(*) FROM comments WHERE created_at >= ?1),
                    (SELECT COUNT(*) FROM likes WHERE created_at >= ?1)",
            params![since],
            |r| {
                Ok(ContentTotals {
                    total_posts: r.get(0)?,
                    total_comments: r.get(1)?,
                    total_likes: r.get(2)?,
                    recent_posts: r.get(3)?,
                    recent_comments: r.get(4)?,
                    recent_likes: r.get(5)?,
                })
            },
        )?)
    }

    fn author_activity(&self, user_id: &str) -> AppResult<AuthorActivity> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT (SELECT COUNT(*) FROM posts WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM comments WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM likes l JOIN posts p ON p.id = l.post_id
                     WHERE p.user_id = ?1)",
            params![user_id],
            |r| {
                Ok(AuthorActivity {
                    post_count: r.get(0)?,
                    comment_count: r.get(1)?,
                    likes_received: r.get(2)?,
                })
            },
        )?)
    }
}

pub(crate) fn fetch_post(conn: &Connection, post_id: &str) -> AppResult<Post> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
        params![post_id],
        Post::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// The post, provided it has not been hidden by moderation.
pub(crate) fn fetch_visible_post(conn: &Connection, post_id: &str) -> AppResult<Post> {
    let post = fetch_post(conn, post_id)?;
    if !post.is_active {
        return Err(AppError::NotFound);
    }
    Ok(post)
}

/// Trimmed text, `None` when blank.
fn normalize_content(raw: Option<&str>) -> AppResult<Option<String>> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > CONTENT_MAX_LEN {
        return Err(AppError::validation(
            "content",
            "Post content cannot exceed 500 characters.",
        ));
    }
    Ok(Some(text.to_string()))
}

fn empty_post() -> AppError {
    AppError::validation("content", "Post must contain either text content or an image.")
}

#[cfg(test)]
pub(crate) fn test_stores() -> (
    tempfile::TempDir,
    crate::accounts::AccountStore,
    ContentStore,
) {
    let (tmp, pool) = crate::db::test_pool();
    (
        tmp,
        crate::accounts::AccountStore::new(pool.clone(), 4),
        ContentStore::new(pool),
    )
}

#[cfg(test)]
pub(crate) fn text_post(content: &str) -> NewPost {
    NewPost {
        id: NewPost::next_id(),
        content: Some(content.to_string()),
        image: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::registration;

    #[test]
    fn empty_post_is_rejected() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let blank = NewPost {
            id: NewPost::next_id(),
            content: Some("   ".into()),
            image: None,
        };
        let err = content.create_post(&alice.id, &blank).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "content"));

        let image_only = NewPost {
            id: NewPost::next_id(),
            content: None,
            image: Some("post_images/x/a.png".into()),
        };
        let post = content.create_post(&alice.id, &image_only).unwrap();
        assert!(post.is_active);
        assert!(post.content.is_none());
    }

    #[test]
    fn overlong_content_is_rejected() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let err = content
            .create_post(&alice.id, &text_post(&"x".repeat(501)))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn only_the_author_may_edit() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let bob = accounts.register(&registration("bob@example.com", "Bob")).unwrap();
        let post = content.create_post(&alice.id, &text_post("draft")).unwrap();

        let edit = PostUpdate {
            content: Some("edited".into()),
            ..Default::default()
        };
        assert!(matches!(
            content.update_post(&bob.id, &post.id, &edit),
            Err(AppError::Forbidden)
        ));
        let (post, cleanup) = content.update_post(&alice.id, &post.id, &edit).unwrap();
        assert!(cleanup.is_empty());
        assert_eq!(post.content.as_deref(), Some("edited"));
    }

    #[test]
    fn update_cannot_strip_text_and_image() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let post = content.create_post(&alice.id, &text_post("only text")).unwrap();
        let err = content
            .update_post(
                &alice.id,
                &post.id,
                &PostUpdate {
                    content: Some(String::new()),
                    image: ImageUpdate::Clear,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn image_swap_releases_previous() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let new = NewPost {
            id: NewPost::next_id(),
            content: Some("pic".into()),
            image: Some("post_images/p/a.png".into()),
        };
        let post = content.create_post(&alice.id, &new).unwrap();

        let (post, cleanup) = content
            .update_post(
                &alice.id,
                &post.id,
                &PostUpdate {
                    content: None,
                    image: ImageUpdate::Replace("post_images/p/b.png".into()),
                },
            )
            .unwrap();
        assert_eq!(post.image.as_deref(), Some("post_images/p/b.png"));
        assert_eq!(cleanup.paths(), ["post_images/p/a.png".to_string()]);
    }

    #[test]
    fn delete_cascades_and_releases_image() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let bob = accounts.register(&registration("bob@example.com", "Bob")).unwrap();
        let new = NewPost {
            id: NewPost::next_id(),
            content: Some("hello".into()),
            image: Some("post_images/p/a.png".into()),
        };
        let post = content.create_post(&bob.id, &new).unwrap();
        content.add_comment(&post.id, &alice.id, "nice").unwrap();
        content.toggle_like(&post.id, &alice.id).unwrap();

        assert!(matches!(
            content.delete_post(&alice, &post.id),
            Err(AppError::Forbidden)
        ));

        let cleanup = content.delete_post(&bob, &post.id).unwrap();
        assert_eq!(cleanup.paths(), ["post_images/p/a.png".to_string()]);

        let conn = content.pool().get().unwrap();
        let orphans: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM comments) + (SELECT COUNT(*) FROM likes)",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn staff_may_delete_any_post() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let mut moderator = accounts.register(&registration("mod@example.com", "Mod")).unwrap();
        accounts.grant_staff(&[moderator.id.clone()]).unwrap();
        moderator.is_staff = true;

        let post = content.create_post(&alice.id, &text_post("spam")).unwrap();
        let cleanup = content.delete_post(&moderator, &post.id).unwrap();
        assert!(cleanup.is_empty());
        assert!(matches!(content.get_post(&post.id), Err(AppError::NotFound)));
    }

    #[test]
    fn hidden_posts_are_visible_to_staff_only() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let post = content.create_post(&alice.id, &text_post("hello")).unwrap();
        content.set_post_active(&post.id, false).unwrap();

        assert!(matches!(
            content.post_view(Viewer::user(&alice), &post.id),
            Err(AppError::NotFound)
        ));
        let staff = Viewer {
            id: None,
            is_staff: true,
        };
        assert!(!content.post_view(staff, &post.id).unwrap().post.is_active);
    }

    #[test]
    fn counts_follow_child_rows() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let bob = accounts.register(&registration("bob@example.com", "Bob")).unwrap();
        let post = content.create_post(&alice.id, &text_post("hello")).unwrap();

        assert_eq!(content.derive_counts(&post.id).unwrap(), (0, 0));
        content.add_comment(&post.id, &bob.id, "hi").unwrap();
        content.add_comment(&post.id, &alice.id, "hey").unwrap();
        content.toggle_like(&post.id, &bob.id).unwrap();
        assert_eq!(content.derive_counts(&post.id).unwrap(), (2, 1));

        let view = content.post_view(Viewer::user(&bob), &post.id).unwrap();
        assert_eq!((view.comment_count, view.like_count), (2, 1));
        assert!(view.is_liked);
        assert_eq!(view.author_name, "Alice");
        assert!(!content.post_view(Viewer::anonymous(), &post.id).unwrap().is_liked);
    }

    #[test]
    fn dependent_assets_lists_post_images() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        content.create_post(&alice.id, &text_post("no image")).unwrap();
        let with_image = NewPost {
            id: NewPost::next_id(),
            content: None,
            image: Some("post_images/p/a.png".into()),
        };
        content.create_post(&alice.id, &with_image).unwrap();

        let conn = content.pool().get().unwrap();
        let images = content.assets_owned_by(&conn, &alice.id).unwrap();
        assert_eq!(images, ["post_images/p/a.png".to_string()]);
    }
}
