// src/storage/mod.rs
//! Blob storage behind one trait: an S3-compatible object store or a local directory

pub mod local;
pub mod s3;

pub use local::LocalBlobStore;
pub use s3::S3BlobStore;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::core::FsOps;
use crate::environment::StorageSettings;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object store error: {0}")]
    Backend(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid blob key: {0:?}")]
    InvalidKey(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Store under a unique variant of `key` and return the key actually used.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, BlobError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobError>;

    /// Keys starting with `prefix`, in lexical order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError>;
}

pub async fn build_store(settings: &StorageSettings) -> Arc<dyn BlobStore> {
    match settings {
        StorageSettings::S3 {
            bucket,
            region,
            endpoint,
            force_path_style,
        } => Arc::new(
            S3BlobStore::connect(bucket, region, endpoint.as_deref(), *force_path_style).await,
        ),
        StorageSettings::Local { root } => Arc::new(LocalBlobStore::new(root.clone())),
    }
}

/// Normalize a key to forward slashes without leading separators.
/// Rejects empty keys and keys containing `..` segments.
pub fn normalize_key(key: &str) -> Result<String, BlobError> {
    let normalized = key.trim().replace('\\', "/");
    let parts: Vec<&str> = normalized
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();

    if parts.is_empty() || parts.iter().any(|p| *p == "..") {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(parts.join("/"))
}

/// Normalize a list prefix. Empty means everything. A trailing `/` is kept so
/// `photos/` does not also match `photos2/`.
pub fn normalize_prefix(prefix: &str) -> Result<String, BlobError> {
    let trimmed = prefix.trim().replace('\\', "/");
    if trimmed.trim_matches('/').is_empty() {
        return Ok(String::new());
    }
    let normalized = normalize_key(&trimmed)?;
    Ok(if trimmed.ends_with('/') {
        format!("{}/", normalized)
    } else {
        normalized
    })
}

/// `dir/stem.ext` becomes `dir/stem_<8 hex>.ext`.
pub fn unique_key(key: &str) -> Result<String, BlobError> {
    let normalized = normalize_key(key)?;
    let (dir, file) = match normalized.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, normalized.as_str()),
    };

    let path = Path::new(file);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("file");
    let ext = FsOps::extension_with_dot(file);

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let unique = format!("{}_{}{}", stem, &suffix[..8], ext);

    Ok(match dir {
        Some(dir) => format!("{}/{}", dir, unique),
        None => unique,
    })
}

/// Content type inferred from the key's extension.
pub fn content_type_for(key: &str) -> &'static str {
    match FsOps::extension_with_dot(key).as_str() {
        ".pdf" => "application/pdf",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".svg" => "image/svg+xml",
        ".txt" => "text/plain",
        ".html" | ".htm" => "text/html",
        _ => "application/octet-stream",
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("/photos//me.jpg").unwrap(), "photos/me.jpg");
        assert_eq!(normalize_key("a\\b.pdf").unwrap(), "a/b.pdf");
        assert!(normalize_key("").is_err());
        assert!(normalize_key("../secret").is_err());
    }

    #[test]
    fn test_normalize_prefix_keeps_directory_slash() {
        assert_eq!(normalize_prefix("photos/").unwrap(), "photos/");
        assert_eq!(normalize_prefix("/photos//").unwrap(), "photos/");
        assert_eq!(normalize_prefix("photos").unwrap(), "photos");
        assert_eq!(normalize_prefix("  ").unwrap(), "");
        assert_eq!(normalize_prefix("/").unwrap(), "");
        assert!(normalize_prefix("../").is_err());
    }

    #[test]
    fn test_unique_key_keeps_dir_and_extension() {
        let key = unique_key("certificates/course/diploma.PDF").unwrap();
        assert!(key.starts_with("certificates/course/diploma_"));
        assert!(key.ends_with(".pdf"));
        assert_eq!(key.len(), "certificates/course/diploma_".len() + 8 + 4);
        assert_ne!(key, unique_key("certificates/course/diploma.PDF").unwrap());

        let bare = unique_key("noext").unwrap();
        assert!(bare.starts_with("noext_"));
        assert_eq!(bare.len(), "noext_".len() + 8);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a/b.pdf"), "application/pdf");
        assert_eq!(content_type_for("me.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
    }
}
