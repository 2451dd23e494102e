use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::accounts::AccountStore;
use crate::config::Config;
use crate::content::ContentStore;
use crate::db;
use crate::media::{LocalMediaStorage, MediaStorage};
use crate::reporting::Reporter;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub accounts: AccountStore,
    pub content: ContentStore,
    pub reporter: Reporter,
    pub media: Arc<dyn MediaStorage>,
}

impl AppState {
    /// Open the database, apply migrations and wire every store.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let pool = db::create_pool(&config.db_path())?;
        db::run_migrations(&pool)?;

        let media = LocalMediaStorage::new(config.media_path(), config.storage.base_url.clone())?;
        tracing::info!("Media root: {}", media.root().display());
        Ok(Self::new(pool, config, Arc::new(media)))
    }

    pub fn new(pool: DbPool, config: Config, media: Arc<dyn MediaStorage>) -> Self {
        let accounts = AccountStore::new(pool.clone(), config.auth.bcrypt_cost);
        let content = ContentStore::new(pool.clone());
        let reporter = Reporter::new(pool.clone(), Some(Arc::new(content.clone())));

        Self {
            db: pool,
            config,
            accounts,
            content,
            reporter,
            media,
        }
    }
}
