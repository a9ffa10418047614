// src/export/fetcher.rs
//! Resource lookup with fallbacks: exact key, basename, extra candidates, local disk.
//!
//! Absence is an expected outcome, so every lookup returns `Option`. Store
//! errors are logged and treated as a miss.

use std::path::PathBuf;
use std::sync::Arc;

use crate::app_log;
use crate::core::FsOps;
use crate::storage::BlobStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFrom {
    Exact,
    Basename,
    /// One of the caller-supplied extra keys.
    Candidate(String),
    Local,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub source: ResolvedFrom,
}

pub struct BlobFetcher {
    store: Arc<dyn BlobStore>,
    local_root: PathBuf,
}

impl BlobFetcher {
    pub fn new(store: Arc<dyn BlobStore>, local_root: PathBuf) -> Self {
        Self { store, local_root }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub async fn fetch(&self, reference: &str) -> Option<Fetched> {
        self.fetch_with_candidates(reference, &[]).await
    }

    /// Like [`fetch`](Self::fetch), trying `extra` store keys after the
    /// basename and before the local directory.
    pub async fn fetch_with_candidates(&self, reference: &str, extra: &[String]) -> Option<Fetched> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        if let Some(bytes) = self.try_store(reference).await {
            return Some(Fetched {
                bytes,
                source: ResolvedFrom::Exact,
            });
        }

        let basename = FsOps::basename(reference);
        let mut tried = vec![reference.to_string()];
        if !basename.is_empty() && basename != reference {
            if let Some(bytes) = self.try_store(basename).await {
                return Some(Fetched {
                    bytes,
                    source: ResolvedFrom::Basename,
                });
            }
            tried.push(basename.to_string());
        }

        for key in extra {
            if tried.contains(key) {
                continue;
            }
            if let Some(bytes) = self.try_store(key).await {
                return Some(Fetched {
                    bytes,
                    source: ResolvedFrom::Candidate(key.clone()),
                });
            }
            tried.push(key.clone());
        }

        if let Some(bytes) = self.try_local(reference).await {
            return Some(Fetched {
                bytes,
                source: ResolvedFrom::Local,
            });
        }

        app_log!(warn, "Resource not found anywhere: {} (tried {:?})", reference, tried);
        None
    }

    async fn try_store(&self, key: &str) -> Option<Vec<u8>> {
        match self.store.get(key).await {
            Ok(Some(bytes)) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                app_log!(warn, "{} store lookup failed for {}: {}", self.store.name(), key, e);
                None
            }
        }
    }

    async fn try_local(&self, reference: &str) -> Option<Vec<u8>> {
        let Some(path) = FsOps::safe_join(&self.local_root, reference) else {
            app_log!(warn, "Rejected local path for reference: {}", reference);
            return None;
        };

        match FsOps::read_optional(&path).await {
            Ok(Some(bytes)) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                app_log!(warn, "Local read failed for {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::MemoryBlobStore;

    fn fetcher(store: MemoryBlobStore, root: PathBuf) -> (BlobFetcher, Arc<MemoryBlobStore>) {
        let store = Arc::new(store);
        (BlobFetcher::new(store.clone(), root), store)
    }

    #[tokio::test]
    async fn test_exact_key_wins() {
        let dir = tempfile::tempdir().unwrap();
        let (fetcher, store) = fetcher(
            MemoryBlobStore::with(&[
                ("certs/a.pdf", b"exact".to_vec()),
                ("a.pdf", b"basename".to_vec()),
            ]),
            dir.path().to_path_buf(),
        );

        let found = fetcher.fetch("certs/a.pdf").await.unwrap();
        assert_eq!(found.bytes, b"exact");
        assert_eq!(found.source, ResolvedFrom::Exact);
        assert_eq!(store.requested(), vec!["certs/a.pdf"]);
    }

    #[tokio::test]
    async fn test_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        FsOps::write_bytes(&dir.path().join("certs/b.pdf"), b"local")
            .await
            .unwrap();
        let (fetcher, store) = fetcher(MemoryBlobStore::default(), dir.path().to_path_buf());

        let found = fetcher.fetch("certs/b.pdf").await.unwrap();
        assert_eq!(found.source, ResolvedFrom::Local);
        assert_eq!(found.bytes, b"local");
        assert_eq!(store.requested(), vec!["certs/b.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_basename_fallback_and_bare_keys() {
        let dir = tempfile::tempdir().unwrap();
        let (fetcher, store) = fetcher(
            MemoryBlobStore::with(&[("c.pdf", b"bare".to_vec())]),
            dir.path().to_path_buf(),
        );

        let found = fetcher.fetch("old/prefix/c.pdf").await.unwrap();
        assert_eq!(found.source, ResolvedFrom::Basename);

        // A bare key is not retried as its own basename.
        assert!(fetcher.fetch("missing.pdf").await.is_none());
        assert_eq!(
            store.requested(),
            vec!["old/prefix/c.pdf", "c.pdf", "missing.pdf"]
        );
    }

    #[tokio::test]
    async fn test_store_errors_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let (fetcher, _) = fetcher(
            MemoryBlobStore::with(&[("d.pdf", b"via basename".to_vec())]).failing_on("x/d.pdf"),
            dir.path().to_path_buf(),
        );

        let found = fetcher.fetch("x/d.pdf").await.unwrap();
        assert_eq!(found.source, ResolvedFrom::Basename);
    }

    #[tokio::test]
    async fn test_empty_blob_and_empty_reference_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let (fetcher, store) = fetcher(
            MemoryBlobStore::with(&[("e.pdf", Vec::new())]),
            dir.path().to_path_buf(),
        );

        assert!(fetcher.fetch("e.pdf").await.is_none());
        assert!(fetcher.fetch("   ").await.is_none());
        assert_eq!(store.requested(), vec!["e.pdf"]);
    }

    #[tokio::test]
    async fn test_candidates_tried_before_local() {
        let dir = tempfile::tempdir().unwrap();
        FsOps::write_bytes(&dir.path().join("f.pdf"), b"local").await.unwrap();
        let (fetcher, store) = fetcher(
            MemoryBlobStore::with(&[("course/f.pdf", b"legacy".to_vec())]),
            dir.path().to_path_buf(),
        );

        let extra = vec![
            "course/certificates/f.pdf".to_string(),
            "course/f.pdf".to_string(),
        ];
        let found = fetcher.fetch_with_candidates("f.pdf", &extra).await.unwrap();
        assert_eq!(found.source, ResolvedFrom::Candidate("course/f.pdf".to_string()));
        assert_eq!(
            store.requested(),
            vec!["f.pdf", "course/certificates/f.pdf", "course/f.pdf"]
        );
    }

    #[tokio::test]
    async fn test_local_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("media");
        FsOps::write_bytes(&dir.path().join("secret.pdf"), b"nope")
            .await
            .unwrap();
        let (fetcher, _) = fetcher(MemoryBlobStore::default(), root);

        assert!(fetcher.fetch("../secret.pdf").await.is_none());
    }
}
