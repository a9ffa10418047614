// src/core/config_manager.rs
//! Configuration assembled from config.yaml, the optional site.toml theme and the environment

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::environment::{EnvironmentConfig, SiteConfig};

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 720;
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl AuthSettings {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("CVFOLIO_JWT_SECRET")
            .context("CVFOLIO_JWT_SECRET environment variable is required")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("CVFOLIO_JWT_SECRET must not be empty");
        }

        let token_ttl_hours = match std::env::var("CVFOLIO_TOKEN_TTL_HOURS") {
            Ok(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("Invalid CVFOLIO_TOKEN_TTL_HOURS: {}", raw))?,
            Err(_) => DEFAULT_TOKEN_TTL_HOURS,
        };

        Ok(Self {
            jwt_secret,
            token_ttl_hours,
        })
    }
}

/// Partial theme override; any field left out keeps the config.yaml value.
#[derive(Debug, Default, Deserialize)]
struct SiteTheme {
    site_header: Option<String>,
    site_title: Option<String>,
    index_title: Option<String>,
    accent_color: Option<String>,
    text_color: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub environment: EnvironmentConfig,
    pub auth: AuthSettings,
}

impl ConfigManager {
    pub fn load() -> Result<Self> {
        let environment = Self::load_environment(Path::new("config.yaml"))?;
        let auth = AuthSettings::from_env()?;

        Ok(Self { environment, auth })
    }

    /// `config.yaml` plus the optional `site.toml` theme, without auth settings.
    pub fn load_environment(config_path: &Path) -> Result<EnvironmentConfig> {
        let mut environment = EnvironmentConfig::load_from(config_path)?;
        environment.site = Self::apply_theme_file(environment.site, Path::new("site.toml"))?;
        Ok(environment)
    }

    pub fn site(&self) -> &SiteConfig {
        &self.environment.site
    }

    fn apply_theme_file(site: SiteConfig, path: &Path) -> Result<SiteConfig> {
        if !path.exists() {
            return Ok(site);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        info!("Applying site theme from {}", path.display());
        Self::apply_theme(site, &content)
    }

    fn apply_theme(mut site: SiteConfig, content: &str) -> Result<SiteConfig> {
        let theme: SiteTheme = toml::from_str(content).context("Failed to parse site.toml")?;

        if let Some(v) = theme.site_header {
            site.site_header = v;
        }
        if let Some(v) = theme.site_title {
            site.site_title = v;
        }
        if let Some(v) = theme.index_title {
            site.index_title = v;
        }
        if let Some(v) = theme.accent_color {
            site.accent_color = v;
        }
        if let Some(v) = theme.text_color {
            site.text_color = v;
        }
        Ok(site)
    }

    pub async fn ensure_directories(&self) -> Result<()> {
        self.environment.ensure_directories().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_overrides_only_given_fields() {
        let site = ConfigManager::apply_theme(
            SiteConfig::default(),
            "site_header = \"ACME Careers\"\naccent_color = \"#ff0000\"\n",
        )
        .unwrap();
        assert_eq!(site.site_header, "ACME Careers");
        assert_eq!(site.accent_color, "#ff0000");
        assert_eq!(site.index_title, SiteConfig::default().index_title);
    }

    #[test]
    fn test_missing_theme_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let site =
            ConfigManager::apply_theme_file(SiteConfig::default(), &dir.path().join("site.toml"))
                .unwrap();
        assert_eq!(site, SiteConfig::default());
    }

    #[test]
    fn test_bad_theme_is_an_error() {
        assert!(ConfigManager::apply_theme(SiteConfig::default(), "site_header = [").is_err());
    }
}
