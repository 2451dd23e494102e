//! Feed assembly.
//!
//! Anonymous viewers browse every active post. A signed-in viewer sees the
//! active posts of everyone they follow plus their own, whether or not they
//! follow themselves. Results are newest first with the post id breaking
//! ties, so paging is stable.

use rusqlite::params;

use crate::content::{post_view_select, ContentStore, PostView};
use crate::db::like_pattern;
use crate::error::AppResult;
use crate::pagination::{Page, PageRequest};

const FEED_FILTER: &str = "p.is_active = 1
    AND (?1 IS NULL
         OR p.user_id = ?1
         OR p.user_id IN (SELECT followed_id FROM follows WHERE follower_id = ?1))
    AND (?2 IS NULL
         OR fold(p.content) LIKE ?2 ESCAPE '\\'
         OR fold(u.name) LIKE ?2 ESCAPE '\\')";

impl ContentStore {
    /// One page of the feed for `viewer`, optionally narrowed to posts whose
    /// text or author name contains `search`.
    pub fn compose_feed(
        &self,
        viewer: Option<&str>,
        search: Option<&str>,
        page: PageRequest,
    ) -> AppResult<Page<PostView>> {
        let conn = self.pool().get()?;
        let pattern = search.map(like_pattern);

        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM posts p JOIN users u ON u.id = p.user_id
                 WHERE {FEED_FILTER}"
            ),
            params![viewer, pattern],
            |r| r.get(0),
        )?;

        // One predicate over `posts`: a post matches at most once.
        let mut stmt = conn.prepare(&format!(
            "{} WHERE {FEED_FILTER}
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT ?3 OFFSET ?4",
            post_view_select()
        ))?;
        let posts = stmt
            .query_map(
                params![viewer, pattern, page.limit(), page.offset()],
                PostView::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(posts, total, page))
    }
}
