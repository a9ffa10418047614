// src/storage/local.rs
use async_trait::async_trait;
use std::path::PathBuf;

use super::{normalize_prefix, unique_key, BlobError, BlobStore};
use crate::app_log;
use crate::core::FsOps;

/// Blob store backed by a local directory. Keys map to relative paths.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        FsOps::safe_join(&self.root, key).ok_or_else(|| BlobError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.path_for(key)?;
        Ok(FsOps::read_optional(&path).await?)
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        let key = unique_key(key)?;
        let path = self.path_for(&key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        app_log!(
            debug,
            "Stored {} ({} bytes, {}) in {}",
            key,
            bytes.len(),
            content_type,
            self.root.display()
        );
        Ok(key)
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await? && path.is_file())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let prefix = normalize_prefix(prefix)?;
        let files = FsOps::list_relative_files(&self.root)
            .await
            .map_err(|e| BlobError::Backend(e.to_string()))?;
        Ok(files
            .into_iter()
            .filter(|key| key.starts_with(&prefix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf());

        let key = store
            .put("certificates/course/a.pdf", b"%PDF-1.4".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert!(key.starts_with("certificates/course/a_"));
        assert_eq!(store.get(&key).await.unwrap(), Some(b"%PDF-1.4".to_vec()));
        assert!(store.exists(&key).await.unwrap());

        store
            .put("photos/me.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(store.list("certificates").await.unwrap(), vec![key]);
        assert_eq!(store.list("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_prefix_respects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf());

        let photo = store.put("photos/me.png", vec![1], "image/png").await.unwrap();
        store.put("photos2/other.png", vec![2], "image/png").await.unwrap();

        assert_eq!(store.list("photos/").await.unwrap(), vec![photo]);
        assert_eq!(store.list("photos").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf());

        assert_eq!(store.get("nope.pdf").await.unwrap(), None);
        assert!(!store.exists("nope.pdf").await.unwrap());
        assert!(matches!(
            store.get("../outside.pdf").await,
            Err(BlobError::InvalidKey(_))
        ));
    }
}
