//! Local filesystem persistence backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use outbox_common::{Error, Result};

use crate::backend::QueueBackend;

/// Filesystem backend.
///
/// Stores each key as `<root>/<key>.json`. Writes go to a temporary file that
/// is then renamed over the target, so a crash mid-write leaves the previous
/// value intact.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Create a new file backend rooted at `root`.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(Error::InvalidInput(format!("Invalid storage key: {}", key)));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl QueueBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key)?;
        let tmp = self.root.join(format!(".{}.json.tmp", key));

        fs::write(&tmp, value)
            .await
            .map_err(|e| Error::Persistence(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Persistence(format!("Failed to replace {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::new(temp.path()).unwrap();

        backend.write("offline-queue", "[]").await.unwrap();
        assert_eq!(
            backend.read("offline-queue").await.unwrap().as_deref(),
            Some("[]")
        );
        assert!(temp.path().join("offline-queue.json").exists());
        assert!(!temp.path().join(".offline-queue.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_key_reads_none() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::new(temp.path()).unwrap();
        assert_eq!(backend.read("offline-queue").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::new(temp.path()).unwrap();
        assert!(backend.write("../escape", "x").await.is_err());
        assert!(backend.write(".hidden", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_creates_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("queue");
        let backend = FileBackend::new(&root).unwrap();
        backend.write("offline-queue", "[]").await.unwrap();
        assert!(root.join("offline-queue.json").exists());
    }
}
