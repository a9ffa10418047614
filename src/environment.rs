// src/environment.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::FsOps;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageSettings {
    S3 {
        bucket: String,
        #[serde(default = "default_region")]
        region: String,
        /// Override for S3-compatible stores such as MinIO.
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        force_path_style: bool,
    },
    Local {
        root: PathBuf,
    },
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RendererSettings {
    #[serde(default = "default_renderer_program")]
    pub program: String,
    #[serde(default = "default_renderer_args")]
    pub args: Vec<String>,
    #[serde(default = "default_renderer_timeout")]
    pub timeout_seconds: u64,
}

fn default_renderer_program() -> String {
    "weasyprint".to_string()
}

fn default_renderer_args() -> Vec<String> {
    vec!["-".to_string(), "-".to_string()]
}

fn default_renderer_timeout() -> u64 {
    60
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            program: default_renderer_program(),
            args: default_renderer_args(),
            timeout_seconds: default_renderer_timeout(),
        }
    }
}

/// Static branding applied to every rendered page. Loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    pub site_header: String,
    pub site_title: String,
    pub index_title: String,
    pub accent_color: String,
    pub text_color: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_header: "cvfolio".to_string(),
            site_title: "cvfolio".to_string(),
            index_title: "Curriculum Vitae".to_string(),
            accent_color: "#10b981".to_string(),
            text_color: "#333333".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub database_path: PathBuf,
    pub media_root: PathBuf,
    pub storage: StorageSettings,
    #[serde(default)]
    pub renderer: RendererSettings,
    #[serde(default)]
    pub site: SiteConfig,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    local: EnvironmentConfig,
    production: EnvironmentConfig,
}

impl EnvironmentConfig {
    /// Load the section selected by the environment from `config_path`.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let environment = Self::get_environment();
        info!("Loading configuration for environment: {}", environment);

        if !config_path.exists() {
            anyhow::bail!(
                "{} not found. Server cannot start without configuration.",
                config_path.display()
            );
        }

        let config_content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_yaml(&config_content, &environment)
    }

    /// Create the media root, the local store root and the database directory.
    pub async fn ensure_directories(&self) -> Result<()> {
        FsOps::ensure_dir_exists(&self.media_root).await?;
        if let StorageSettings::Local { root } = &self.storage {
            FsOps::ensure_dir_exists(root).await?;
        }
        if let Some(db_parent) = self.database_path.parent() {
            FsOps::ensure_dir_exists(db_parent).await?;
        }
        Ok(())
    }

    pub fn get_environment() -> String {
        std::env::var("CVFOLIO_ENV")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .or_else(|_| std::env::var("ENV"))
            .unwrap_or_else(|_| "local".to_string())
    }

    pub fn from_yaml(content: &str, environment: &str) -> Result<Self> {
        let config_file: ConfigFile =
            serde_yaml::from_str(content).context("Failed to parse config.yaml")?;

        let env_config = match environment {
            "production" => config_file.production,
            _ => config_file.local,
        };

        env_config.resolved()
    }

    /// Make every configured path absolute.
    fn resolved(self) -> Result<Self> {
        let storage = match self.storage {
            StorageSettings::Local { root } => StorageSettings::Local {
                root: Self::resolve_path(&root)?,
            },
            s3 => s3,
        };

        Ok(Self {
            database_path: Self::resolve_path(&self.database_path)?,
            media_root: Self::resolve_path(&self.media_root)?,
            storage,
            renderer: self.renderer,
            site: self.site,
        })
    }

    fn resolve_path(path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            let current_dir = std::env::current_dir().context("Failed to get current directory")?;
            Ok(current_dir.join(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
local:
  database_path: data/cvfolio.db
  media_root: media
  storage:
    backend: local
    root: blobs
production:
  database_path: /app/data/cvfolio.db
  media_root: /app/media
  storage:
    backend: s3
    bucket: cvfolio-media
    endpoint: http://minio:9000
    force_path_style: true
  renderer:
    program: wkhtmltopdf
    args: ["--quiet", "-", "-"]
  site:
    site_header: "MARTI OPS"
"#;

    #[test]
    fn test_local_section_resolves_relative_paths() {
        let config = EnvironmentConfig::from_yaml(SAMPLE, "local").unwrap();
        assert!(config.database_path.is_absolute());
        assert!(config.media_root.ends_with("media"));
        match config.storage {
            StorageSettings::Local { root } => assert!(root.is_absolute()),
            other => panic!("unexpected storage: {:?}", other),
        }
        assert_eq!(config.renderer, RendererSettings::default());
        assert_eq!(config.site, SiteConfig::default());
    }

    #[test]
    fn test_production_section() {
        let config = EnvironmentConfig::from_yaml(SAMPLE, "production").unwrap();
        assert_eq!(
            config.storage,
            StorageSettings::S3 {
                bucket: "cvfolio-media".to_string(),
                region: "us-east-1".to_string(),
                endpoint: Some("http://minio:9000".to_string()),
                force_path_style: true,
            }
        );
        assert_eq!(config.renderer.program, "wkhtmltopdf");
        assert_eq!(config.renderer.timeout_seconds, 60);
        assert_eq!(config.site.site_header, "MARTI OPS");
        assert_eq!(config.site.index_title, "Curriculum Vitae");
    }

    #[test]
    fn test_unknown_environment_falls_back_to_local() {
        let config = EnvironmentConfig::from_yaml(SAMPLE, "staging").unwrap();
        assert!(matches!(config.storage, StorageSettings::Local { .. }));
    }
}
