use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{fetch_visible_post, ContentStore};
use crate::db::models::{Comment, User};
use crate::db::{immediate, time_column, timestamp};
use crate::error::{AppError, AppResult};

pub const COMMENT_MAX_LEN: usize = 300;

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.user_id, u.name, c.text, c.created_at
     FROM comments c
     JOIN users u ON u.id = c.user_id";

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        user_name: row.get(3)?,
        text: row.get(4)?,
        created_at: time_column(row, 5)?,
    })
}

impl ContentStore {
    pub fn add_comment(&self, post_id: &str, author_id: &str, text: &str) -> AppResult<Comment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::validation("text", "Comment text is required."));
        }
        if text.chars().count() > COMMENT_MAX_LEN {
            return Err(AppError::validation(
                "text",
                "Comment cannot exceed 300 characters.",
            ));
        }

        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let comment = immediate(&conn, |tx| {
            fetch_visible_post(tx, post_id)?;
            tx.execute(
                "INSERT INTO comments (id, post_id, user_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, post_id, author_id, text, timestamp(&Utc::now())],
            )?;
            fetch_comment(tx, &id)
        })?;

        tracing::debug!("Comment {} on post {}", comment.id, post_id);
        Ok(comment)
    }

    /// The thread under a visible post, oldest first.
    pub fn list_comments(&self, post_id: &str) -> AppResult<Vec<Comment>> {
        let conn = self.pool.get()?;
        fetch_visible_post(&conn, post_id)?;
        thread(&conn, post_id)
    }

    /// Thread for a post regardless of moderation state.
    pub(crate) fn thread(&self, post_id: &str) -> AppResult<Vec<Comment>> {
        let conn = self.pool.get()?;
        thread(&conn, post_id)
    }

    /// Allowed for the comment's author and for staff.
    pub fn delete_comment(&self, actor: &User, comment_id: &str) -> AppResult<()> {
        let conn = self.pool.get()?;
        immediate(&conn, |tx| {
            let comment = fetch_comment(tx, comment_id)?;
            if comment.user_id != actor.id && !actor.is_staff {
                return Err(AppError::Forbidden);
            }
            tx.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
            Ok(())
        })?;
        tracing::debug!("Comment {} deleted by {}", comment_id, actor.id);
        Ok(())
    }
}

fn fetch_comment(conn: &Connection, comment_id: &str) -> AppResult<Comment> {
    conn.query_row(
        &format!("{COMMENT_SELECT} WHERE c.id = ?1"),
        params![comment_id],
        comment_from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

fn thread(conn: &Connection, post_id: &str) -> AppResult<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.id ASC"
    ))?;
    let comments = stmt
        .query_map(params![post_id], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::super::{test_stores, text_post};
    use crate::accounts::registration;
    use crate::error::AppError;

    #[test]
    fn comment_text_is_validated() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let post = content.create_post(&alice.id, &text_post("hello")).unwrap();

        let long = "x".repeat(301);
        for bad in ["", "   ", long.as_str()] {
            let err = content.add_comment(&post.id, &alice.id, bad).unwrap_err();
            assert!(matches!(err, AppError::Validation { ref field, .. } if field == "text"));
        }
        content
            .add_comment(&post.id, &alice.id, &"x".repeat(300))
            .unwrap();
    }

    #[test]
    fn thread_is_chronological() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let bob = accounts.register(&registration("bob@example.com", "Bob")).unwrap();
        let post = content.create_post(&alice.id, &text_post("hello")).unwrap();

        content.add_comment(&post.id, &bob.id, "first").unwrap();
        content.add_comment(&post.id, &alice.id, "second").unwrap();

        let thread = content.list_comments(&post.id).unwrap();
        let texts: Vec<_> = thread.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        assert_eq!(thread[0].user_name, "Bob");
    }

    #[test]
    fn commenting_on_missing_or_hidden_post_is_not_found() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        assert!(matches!(
            content.add_comment("missing", &alice.id, "hi"),
            Err(AppError::NotFound)
        ));

        let post = content.create_post(&alice.id, &text_post("hello")).unwrap();
        content.set_post_active(&post.id, false).unwrap();
        assert!(matches!(
            content.add_comment(&post.id, &alice.id, "hi"),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn only_author_or_staff_deletes_comment() {
        let (_tmp, accounts, content) = test_stores();
        let alice = accounts.register(&registration("alice@example.com", "Alice")).unwrap();
        let bob = accounts.register(&registration("bob@example.com", "Bob")).unwrap();
        let post = content.create_post(&alice.id, &text_post("hello")).unwrap();
        let comment = content.add_comment(&post.id, &bob.id, "mine").unwrap();

        assert!(matches!(
            content.delete_comment(&alice, &comment.id),
            Err(AppError::Forbidden)
        ));
        content.delete_comment(&bob, &comment.id).unwrap();
        assert!(content.list_comments(&post.id).unwrap().is_empty());
        assert!(matches!(
            content.delete_comment(&bob, &comment.id),
            Err(AppError::NotFound)
        ));
    }
}
