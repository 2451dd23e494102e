//! Uploaded media: where bytes live and when they are released.
//!
//! Records hold a storage *path*; the bytes behind it are owned by exactly
//! one row. Stores never touch storage themselves. A mutation that may orphan
//! an asset returns an [`AssetCleanup`], and the caller runs it once the
//! relational write has committed.

mod lifecycle;
mod local;
mod upload;

use std::io;

pub use self::lifecycle::{settle, AssetCleanup};
pub use self::local::LocalMediaStorage;
pub use self::upload::{post_image_path, profile_picture_path, validate_upload, ImageUpload};

/// Minimal file store used for profile and post images.
pub trait MediaStorage: Send + Sync {
    fn exists(&self, path: &str) -> io::Result<bool>;

    /// Remove the asset at `path`. A missing asset is not an error.
    fn delete(&self, path: &str) -> io::Result<()>;

    /// Write `bytes` at `path`, replacing anything there, and return its URL.
    fn save(&self, path: &str, bytes: &[u8]) -> io::Result<String>;

    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Public URL for a stored path.
    fn url(&self, path: &str) -> String;

    /// Remove `dir` if it holds nothing. Returns whether it was removed.
    fn remove_dir_if_empty(&self, dir: &str) -> io::Result<bool>;
}

/// Image change requested alongside a record update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageUpdate {
    #[default]
    Keep,
    Replace(String),
    Clear,
}

impl ImageUpdate {
    /// The value to persist, given the currently persisted one.
    pub fn resolve(&self, current: Option<&str>) -> Option<String> {
        match self {
            ImageUpdate::Keep => current.map(str::to_owned),
            ImageUpdate::Replace(path) => Some(path.clone()),
            ImageUpdate::Clear => None,
        }
    }

    /// Path of a freshly stored asset that nothing references yet.
    pub fn pending_path(&self) -> Option<&str> {
        match self {
            ImageUpdate::Replace(path) => Some(path),
            _ => None,
        }
    }
}
