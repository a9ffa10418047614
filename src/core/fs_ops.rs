// src/core/fs_ops.rs
//! File system helpers shared by the local blob store, the fetcher and the CLI

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::app_log;

pub struct FsOps;

impl FsOps {
    pub async fn ensure_dir_exists(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)
                .await
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
            app_log!(info, "Created directory: {}", path.display());
        }
        Ok(())
    }

    /// Write bytes, creating parent directories as needed.
    pub async fn write_bytes(path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            Self::ensure_dir_exists(parent).await?;
        }

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write file: {}", path.display()))?;

        app_log!(debug, "Written file: {} ({} bytes)", path.display(), content.len());
        Ok(())
    }

    /// Read a file that may legitimately be absent. `Ok(None)` means not found.
    pub async fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Join a slash-separated reference onto `root`.
    ///
    /// Returns `None` for references that are empty, absolute, or climb out of
    /// the root with `..`.
    pub fn safe_join(root: &Path, reference: &str) -> Option<PathBuf> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return None;
        }

        let mut joined = root.to_path_buf();
        for part in trimmed.split(['/', '\\']) {
            if part.is_empty() || part == "." {
                continue;
            }
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(name)), None) => joined.push(name),
                _ => return None,
            }
        }

        if joined == root {
            None
        } else {
            Some(joined)
        }
    }

    /// Filename portion of a slash-separated reference.
    pub fn basename(reference: &str) -> &str {
        reference
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(reference)
    }

    /// Recursively list regular files below `dir`, as slash-separated paths
    /// relative to `dir`, sorted.
    pub async fn list_relative_files(dir: &Path) -> Result<Vec<String>> {
        let mut found = Vec::new();
        if !dir.exists() {
            return Ok(found);
        }

        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current)
                .await
                .with_context(|| format!("Failed to read directory: {}", current.display()))?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    if let Ok(relative) = path.strip_prefix(dir) {
                        let key = relative
                            .components()
                            .filter_map(|c| c.as_os_str().to_str())
                            .collect::<Vec<_>>()
                            .join("/");
                        found.push(key);
                    }
                }
            }
        }

        found.sort();
        Ok(found)
    }

    /// Lowercased extension including the leading dot, or empty.
    pub fn extension_with_dot(name: &str) -> String {
        Path::new(Self::basename(name))
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_default()
    }
}
