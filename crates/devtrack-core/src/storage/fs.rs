//! Filesystem blob store for local use.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{normalize_object_key, BlobStore};
use crate::{Error, Result};

/// Writes blobs under a root directory and returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        let key = normalize_object_key(key)?;
        let path = self.root.join(&key);
        if tokio::fs::try_exists(&path).await? {
            return Err(Error::Storage(format!(
                "Refusing to overwrite existing blob {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        let absolute = std::path::absolute(&path)?;
        Ok(format!("file://{}", absolute.display()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn put_writes_file_and_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let url = store
            .put("devices/d1/1.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("devices/d1/1.png"));
        assert_eq!(
            std::fs::read(dir.path().join("devices/d1/1.png")).unwrap(),
            vec![1, 2, 3]
        );

        let again = store.put("devices/d1/1.png", vec![9], "image/png").await;
        assert!(matches!(again, Err(Error::Storage(_))));
    }
}
