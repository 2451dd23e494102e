use std::path::Path;

use super::MediaStorage;
use crate::error::AppResult;

/// Assets to release once a relational write has committed.
///
/// Built by the store while it still holds the transaction, from the values
/// it read out of the database, and handed back to the caller. Running it is
/// best-effort: failures are logged and never surface.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[must_use = "orphaned assets are only released when the cleanup is run"]
pub struct AssetCleanup {
    paths: Vec<String>,
}

impl AssetCleanup {
    pub fn none() -> Self {
        Self::default()
    }

    /// Cleanup after an update: `previous` was persisted before the write,
    /// `current` is what the write persisted.
    pub fn replaced(previous: Option<String>, current: Option<&str>) -> Self {
        match previous {
            Some(prev) if Some(prev.as_str()) != current => Self { paths: vec![prev] },
            _ => Self::none(),
        }
    }

    /// Cleanup after deleting rows that owned these assets.
    pub fn released(paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// A freshly saved asset whose write never committed.
    pub fn abandoned(path: Option<&str>) -> Self {
        Self {
            paths: path.map(str::to_owned).into_iter().collect(),
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete every asset and then its directory if that left it empty.
    /// Returns how many assets were deleted.
    pub fn run(self, storage: &dyn MediaStorage) -> usize {
        let mut deleted = 0;
        for path in self.paths {
            match release(storage, &path) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to release asset {}: {}", path, e),
            }
        }
        deleted
    }
}

/// Finish a write that may have stored `pending` before it ran.
///
/// On success the write's own cleanup runs. On failure the pending asset is
/// unreferenced, so it is released instead and the error passes through.
pub fn settle<T>(
    storage: &dyn MediaStorage,
    pending: Option<&str>,
    result: AppResult<(T, AssetCleanup)>,
) -> AppResult<T> {
    match result {
        Ok((value, cleanup)) => {
            cleanup.run(storage);
            Ok(value)
        }
        Err(e) => {
            AssetCleanup::abandoned(pending).run(storage);
            Err(e)
        }
    }
}

fn release(storage: &dyn MediaStorage, path: &str) -> std::io::Result<bool> {
    if !storage.exists(path)? {
        return Ok(false);
    }
    storage.delete(path)?;
    tracing::info!("Released asset {}", path);

    if let Some(dir) = Path::new(path).parent().and_then(Path::to_str) {
        if !dir.is_empty() {
            match storage.remove_dir_if_empty(dir) {
                Ok(true) => tracing::debug!("Removed empty directory {}", dir),
                Ok(false) => {}
                Err(e) => tracing::debug!("Could not remove directory {}: {}", dir, e),
            }
        }
    }

    Ok(true)
}
