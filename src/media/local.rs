use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use url::Url;

use super::MediaStorage;

/// Media stored on the local filesystem under a single root directory.
pub struct LocalMediaStorage {
    root: PathBuf,
    base_url: Url,
}

impl LocalMediaStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: Url) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, base_url })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative storage path, refusing anything that escapes the root.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid media path: {path}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl MediaStorage for LocalMediaStorage {
    fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.resolve(path)?.exists())
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        match fs::remove_file(self.resolve(path)?) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn save(&self, path: &str, bytes: &[u8]) -> io::Result<String> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, bytes)?;
        Ok(self.url(path))
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?)
    }

    fn url(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map(String::from)
            .unwrap_or_else(|_| format!("{}{}", self.base_url, path))
    }

    fn remove_dir_if_empty(&self, dir: &str) -> io::Result<bool> {
        let full = self.resolve(dir)?;
        if !full.is_dir() || fs::read_dir(&full)?.next().is_some() {
            return Ok(false);
        }
        fs::remove_dir(&full)?;
        Ok(true)
    }
}
