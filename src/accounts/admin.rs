use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;

use super::{fetch_user, AccountStore};
use crate::db::{immediate, timestamp};
use crate::error::{AppError, AppResult};
use crate::media::AssetCleanup;

/// Assets owned by records that cascade away with a user.
///
/// Called inside the deleting transaction, before the user row goes.
pub trait DependentAssets: Send + Sync {
    fn assets_owned_by(&self, conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkUpdate {
    pub updated: usize,
    /// The acting admin was in the selection and left untouched.
    pub skipped_self: bool,
}

impl AccountStore {
    /// Activate or deactivate a set of users. The actor is never
    /// deactivated, whatever the selection says.
    pub fn set_users_active(
        &self,
        actor_id: &str,
        user_ids: &[String],
        active: bool,
    ) -> AppResult<BulkUpdate> {
        let conn = self.pool.get()?;
        let now = timestamp(&Utc::now());

        immediate(&conn, |tx| {
            let mut result = BulkUpdate {
                updated: 0,
                skipped_self: false,
            };
            for id in user_ids {
                if !active && id == actor_id {
                    result.skipped_self = true;
                    continue;
                }
                result.updated += tx.execute(
                    "UPDATE users SET is_active = ?1, updated_at = ?2
                     WHERE id = ?3 AND is_active <> ?1",
                    params![active, now, id],
                )?;
            }
            if !active {
                // Deactivated users lose their sessions immediately.
                for id in user_ids.iter().filter(|id| *id != actor_id) {
                    tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![id])?;
                }
            }
            Ok::<_, AppError>(result)
        })
        .inspect(|r| {
            tracing::info!(
                "{} {} user(s) by {}",
                if active { "Activated" } else { "Deactivated" },
                r.updated,
                actor_id
            )
        })
    }

    pub fn grant_staff(&self, user_ids: &[String]) -> AppResult<usize> {
        let conn = self.pool.get()?;
        let now = timestamp(&Utc::now());
        immediate(&conn, |tx| {
            let mut updated = 0;
            for id in user_ids {
                updated += tx.execute(
                    "UPDATE users SET is_staff = 1, updated_at = ?1 WHERE id = ?2 AND is_staff = 0",
                    params![now, id],
                )?;
            }
            Ok::<_, AppError>(updated)
        })
    }

    /// Delete a user and everything that cascades from it. The returned
    /// cleanup releases the profile image and every asset reported by
    /// `dependents`.
    pub fn delete_user(
        &self,
        actor_id: &str,
        user_id: &str,
        dependents: &[&dyn DependentAssets],
    ) -> AppResult<AssetCleanup> {
        if actor_id == user_id {
            return Err(AppError::InvalidOperation(
                "You cannot delete your own account.".into(),
            ));
        }

        let conn = self.pool.get()?;
        let released = immediate(&conn, |tx| {
            let user = fetch_user(tx, user_id)?;
            let mut released: Vec<String> = user.profile_picture.into_iter().collect();
            for dependent in dependents {
                released.extend(dependent.assets_owned_by(tx, user_id)?);
            }
            tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
            Ok::<_, AppError>(released)
        })?;

        tracing::info!("User {} deleted by {}", user_id, actor_id);
        Ok(AssetCleanup::released(released))
    }
}
