//! Identity store: user records, credentials and the follow graph.

mod admin;
mod follows;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::auth::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::db::models::{User, USER_COLUMNS};
use crate::db::{immediate, is_unique_violation, like_pattern, timestamp};
use crate::error::{AppError, AppResult};
use crate::media::{AssetCleanup, ImageUpdate};
use crate::pagination::{Page, PageRequest};
use crate::state::DbPool;

pub use self::admin::{BulkUpdate, DependentAssets};
pub use self::follows::{FollowToggle, FollowView};

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 150;
pub const BIO_MAX_LEN: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub name: String,
    pub password: String,
    pub password_confirm: String,
}

/// Self-service profile edit. `None` leaves a field untouched; an empty bio
/// clears it.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub image: ImageUpdate,
}

/// A user together with its follow-graph projections relative to a viewer.
#[derive(Debug, Clone)]
pub struct ProfileSummary {
    pub user: User,
    pub follower_count: i64,
    pub following_count: i64,
    pub is_following: bool,
}

#[derive(Clone)]
pub struct AccountStore {
    pool: DbPool,
    bcrypt_cost: u32,
}

impl AccountStore {
    pub fn new(pool: DbPool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Create an ordinary account. The email is stored lowercased and must be
    /// unique regardless of case.
    pub fn register(&self, registration: &Registration) -> AppResult<User> {
        let email = normalize_email(&registration.email)?;
        let name = validate_name(&registration.name)?;
        if registration.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(
                "password",
                "Password must be at least 8 characters long.",
            ));
        }
        if registration.password != registration.password_confirm {
            return Err(AppError::validation(
                "password_confirm",
                "Passwords do not match.",
            ));
        }

        let hash = hash_password(&registration.password, self.bcrypt_cost)?;
        let user = self.insert_user(&email, &name, &hash, false)?;
        tracing::info!("New user created: {} ({})", user.email, user.id);
        Ok(user)
    }

    /// Create an active staff + superuser account.
    pub fn create_superuser(&self, email: &str, name: &str, password: &str) -> AppResult<User> {
        let email = normalize_email(email)?;
        let name = validate_name(name)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(
                "password",
                "Password must be at least 8 characters long.",
            ));
        }
        let hash = hash_password(password, self.bcrypt_cost)?;
        let user = self.insert_user(&email, &name, &hash, true)?;
        tracing::info!("Superuser created: {} ({})", user.email, user.id);
        Ok(user)
    }

    fn insert_user(&self, email: &str, name: &str, hash: &str, elevated: bool) -> AppResult<User> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let now = timestamp(&Utc::now());

        immediate(&conn, |tx| {
            if email_taken(tx, email, None)? {
                return Err(duplicate_email());
            }
            tx.execute(
                "INSERT INTO users (id, email, name, password_hash, is_active, is_staff,
                                    is_superuser, date_joined, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5, ?6, ?6)",
                params![id, email, name, hash, elevated, now],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    duplicate_email()
                } else {
                    e.into()
                }
            })?;
            fetch_user(tx, &id)
        })
    }

    /// Verify credentials and stamp `last_login`. Unknown email, wrong
    /// password and inactive accounts are indistinguishable to the caller.
    pub fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let conn = self.pool.get()?;
        let email = email.trim().to_lowercase();

        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                User::from_row,
            )
            .optional()?
            .filter(|u| u.is_active && verify_password(password, &u.password_hash))
            .ok_or(AppError::Unauthorized)?;

        let now = Utc::now();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![timestamp(&now), user.id],
        )?;

        Ok(User {
            last_login: Some(now),
            ..user
        })
    }

    pub fn get(&self, user_id: &str) -> AppResult<User> {
        let conn = self.pool.get()?;
        fetch_user(&conn, user_id)
    }

    pub fn get_active(&self, user_id: &str) -> AppResult<User> {
        let user = self.get(user_id)?;
        if user.is_active {
            Ok(user)
        } else {
            Err(AppError::NotFound)
        }
    }

    /// Profile of `user_id` as seen by `viewer`.
    pub fn profile(&self, viewer: Option<&str>, user_id: &str) -> AppResult<ProfileSummary> {
        let user = self.get_active(user_id)?;
        let follower_count = self.follower_count(&user.id)?;
        let following_count = self.following_count(&user.id)?;
        let is_following = match viewer {
            Some(v) if v != user.id => self.is_following(v, &user.id)?,
            _ => false,
        };
        Ok(ProfileSummary {
            user,
            follower_count,
            following_count,
            is_following,
        })
    }

    /// Apply a profile edit. The previously persisted image is read inside
    /// the transaction; the returned cleanup releases it if it was replaced.
    pub fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> AppResult<(User, AssetCleanup)> {
        let name = update.name.as_deref().map(validate_name).transpose()?;
        let bio = update.bio.as_deref().map(validate_bio).transpose()?;

        let conn = self.pool.get()?;
        let (user, previous) = immediate(&conn, |tx| {
            let current = fetch_user(tx, user_id)?;
            let previous = current.profile_picture.clone();
            let picture = update.image.resolve(previous.as_deref());

            tx.execute(
                "UPDATE users SET name = ?1, bio = ?2, profile_picture = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    name.as_deref().unwrap_or(&current.name),
                    bio.clone().unwrap_or(current.bio.clone()),
                    picture,
                    timestamp(&Utc::now()),
                    user_id,
                ],
            )?;

            Ok::<_, AppError>((fetch_user(tx, user_id)?, previous))
        })?;

        let cleanup = AssetCleanup::replaced(previous, user.profile_picture.as_deref());
        Ok((user, cleanup))
    }

    pub fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> AppResult<()> {
        let user = self.get(user_id)?;
        if !verify_password(old_password, &user.password_hash) {
            return Err(AppError::validation("old_password", "Old password is incorrect."));
        }
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(
                "new_password",
                "Password must be at least 8 characters long.",
            ));
        }
        if new_password != confirm_password {
            return Err(AppError::validation(
                "confirm_password",
                "New passwords do not match.",
            ));
        }

        let hash = hash_password(new_password, self.bcrypt_cost)?;
        let conn = self.pool.get()?;
        immediate(&conn, |tx| {
            tx.execute(
                "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
                params![hash, timestamp(&Utc::now()), user_id],
            )?;
            Ok::<_, AppError>(())
        })
    }

    pub fn update_email(
        &self,
        user_id: &str,
        new_email: &str,
        current_password: &str,
    ) -> AppResult<User> {
        let user = self.get(user_id)?;
        if !verify_password(current_password, &user.password_hash) {
            return Err(AppError::validation(
                "current_password",
                "Current password is incorrect.",
            ));
        }
        let email = normalize_email(new_email)?;

        let conn = self.pool.get()?;
        immediate(&conn, |tx| {
            if email_taken(tx, &email, Some(user_id))? {
                return Err(AppError::Conflict("This email is already in use.".into()));
            }
            tx.execute(
                "UPDATE users SET email = ?1, updated_at = ?2 WHERE id = ?3",
                params![email, timestamp(&Utc::now()), user_id],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict("This email is already in use.".into())
                } else {
                    e.into()
                }
            })?;
            fetch_user(tx, user_id)
        })
    }

    /// Active users, newest first.
    pub fn list_profiles(&self, page: PageRequest) -> AppResult<Page<User>> {
        let conn = self.pool.get()?;
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM users WHERE is_active = 1", [], |r| {
                r.get(0)
            })?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_active = 1
             ORDER BY date_joined DESC, id DESC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let users = stmt
            .query_map(params![page.limit(), page.offset()], User::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(users, total, page))
    }

    /// Case-insensitive substring match over name, email and bio, ordered by
    /// name. A missing query matches everyone.
    pub fn search(
        &self,
        query: Option<&str>,
        active_only: bool,
        page: PageRequest,
    ) -> AppResult<Page<User>> {
        let conn = self.pool.get()?;
        let pattern = query.map(like_pattern);
        let filter = "(?1 = 0 OR is_active = 1)
             AND (?2 IS NULL
                  OR fold(name) LIKE ?2 ESCAPE '\\'
                  OR fold(email) LIKE ?2 ESCAPE '\\'
                  OR fold(bio) LIKE ?2 ESCAPE '\\')";

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users WHERE {filter}"),
            params![active_only, pattern],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {filter}
             ORDER BY name COLLATE NOCASE, id
             LIMIT ?3 OFFSET ?4"
        ))?;
        let users = stmt
            .query_map(
                params![active_only, pattern, page.limit(), page.offset()],
                User::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(users, total, page))
    }
}

pub(crate) fn fetch_user(conn: &Connection, user_id: &str) -> AppResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![user_id],
        User::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

fn email_taken(conn: &Connection, email: &str, except: Option<&str>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1 COLLATE NOCASE AND id IS NOT ?2",
        params![email, except],
        |r| r.get(0),
    )
}

fn duplicate_email() -> AppError {
    AppError::Conflict("A user with this email already exists.".into())
}

/// Trim, lowercase and sanity-check an email address.
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::validation("email", "Enter a valid email address."));
    }
    Ok(email)
}

pub fn validate_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if len < NAME_MIN_LEN {
        return Err(AppError::validation(
            "name",
            "Name must be at least 2 characters long.",
        ));
    }
    if len > NAME_MAX_LEN {
        return Err(AppError::validation(
            "name",
            "Name cannot exceed 150 characters.",
        ));
    }
    Ok(name.to_string())
}

/// `Some("")` clears the bio.
fn validate_bio(raw: &str) -> AppResult<Option<String>> {
    if raw.chars().count() > BIO_MAX_LEN {
        return Err(AppError::validation("bio", "Bio cannot exceed 500 characters."));
    }
    let bio = raw.trim();
    Ok((!bio.is_empty()).then(|| bio.to_string()))
}

#[cfg(test)]
pub(crate) fn test_store() -> (tempfile::TempDir, AccountStore) {
    let (tmp, pool) = crate::db::test_pool();
    (tmp, AccountStore::new(pool, 4))
}

#[cfg(test)]
pub(crate) fn registration(email: &str, name: &str) -> Registration {
    Registration {
        email: email.to_string(),
        name: name.to_string(),
        password: "password123".to_string(),
        password_confirm: "password123".to_string(),
    }
}
