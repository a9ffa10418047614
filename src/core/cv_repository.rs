// src/core/cv_repository.rs
//! Profile and section persistence. Every statement is owner-scoped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::app_log;
use crate::core::access::{PROFILES, SECTIONS};
use crate::types::{CvDocument, Profile, Section, SectionKind, SectionPayload, User};

const SECTION_COLUMNS: &str =
    "id, owner_id, kind, sort_order, active, certificate, payload, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct SectionRow {
    id: i64,
    owner_id: i64,
    kind: String,
    sort_order: i64,
    active: bool,
    certificate: Option<String>,
    payload: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SectionRow> for Section {
    type Error = anyhow::Error;

    fn try_from(row: SectionRow) -> Result<Self> {
        let payload: SectionPayload = serde_json::from_str(&row.payload)
            .with_context(|| format!("Corrupt payload for section {}", row.id))?;
        if payload.kind().as_str() != row.kind {
            anyhow::bail!(
                "Section {} stored as '{}' but payload is '{}'",
                row.id,
                row.kind,
                payload.kind()
            );
        }

        Ok(Section {
            id: row.id,
            owner_id: row.owner_id,
            sort_order: row.sort_order,
            active: row.active,
            certificate: row.certificate.filter(|c| !c.is_empty()),
            payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Optional changes applied by [`CvRepository::update_section`].
#[derive(Debug, Clone, Default)]
pub struct SectionChanges {
    pub payload: Option<SectionPayload>,
    pub active: Option<bool>,
    pub sort_order: Option<i64>,
}

pub struct CvRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CvRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    // ===== Profile =====

    /// Stored profile, if any. Never writes.
    pub async fn find_profile(&self, user_id: i64) -> Result<Option<Profile>> {
        let scope = PROFILES.scope(user_id);
        let stored: Option<(String,)> = sqlx::query_as(&scope.select("data", None, None))
            .bind(scope.owner_id())
            .fetch_optional(self.pool)
            .await?;

        stored
            .map(|(data,)| {
                serde_json::from_str(&data)
                    .with_context(|| format!("Corrupt profile for user {}", user_id))
            })
            .transpose()
    }

    /// Stored profile, creating an empty one on first access.
    pub async fn get_profile(&self, user_id: i64) -> Result<Profile> {
        if let Some(profile) = self.find_profile(user_id).await? {
            return Ok(profile);
        }
        let profile = Profile::default();
        self.save_profile(user_id, &profile).await?;
        app_log!(debug, "Created default profile for user {}", user_id);
        Ok(profile)
    }

    pub async fn save_profile(&self, user_id: i64, profile: &Profile) -> Result<()> {
        let data = serde_json::to_string(profile)?;
        let now = Utc::now();

        // Profiles are keyed by user id, so the upsert is inherently owner-scoped.
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, data, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(data)
        .bind(now)
        .execute(self.pool)
        .await
        .with_context(|| format!("Failed to save profile for user {}", user_id))?;
        Ok(())
    }

    pub async fn set_profile_photo(&self, user_id: i64, photo: Option<&str>) -> Result<Profile> {
        let mut profile = self.get_profile(user_id).await?;
        profile.photo = photo.map(str::to_string);
        self.save_profile(user_id, &profile).await?;
        Ok(profile)
    }

    // ===== Sections =====

    /// Sections of one owner in stored order, optionally restricted to a kind.
    pub async fn list_sections(
        &self,
        owner_id: i64,
        kind: Option<SectionKind>,
    ) -> Result<Vec<Section>> {
        let scope = SECTIONS.scope(owner_id);
        let sql = scope.select(
            SECTION_COLUMNS,
            kind.map(|_| "kind = ?"),
            Some("sort_order ASC, id ASC"),
        );

        let mut query = sqlx::query_as::<_, SectionRow>(&sql);
        if let Some(kind) = kind {
            query = query.bind(kind.as_str());
        }
        let rows = query.bind(scope.owner_id()).fetch_all(self.pool).await?;

        rows.into_iter().map(Section::try_from).collect()
    }

    pub async fn get_section(
        &self,
        owner_id: i64,
        kind: SectionKind,
        id: i64,
    ) -> Result<Option<Section>> {
        let scope = SECTIONS.scope(owner_id);
        let row = sqlx::query_as::<_, SectionRow>(&scope.select(
            SECTION_COLUMNS,
            Some("kind = ? AND id = ?"),
            None,
        ))
        .bind(kind.as_str())
        .bind(id)
        .bind(scope.owner_id())
        .fetch_optional(self.pool)
        .await?;

        row.map(Section::try_from).transpose()
    }

    /// Append a section at the end of its kind.
    pub async fn create_section(&self, owner_id: i64, payload: SectionPayload) -> Result<Section> {
        let kind = payload.kind();
        let scope = SECTIONS.scope(owner_id);

        let (last,): (Option<i64>,) = sqlx::query_as(&scope.select(
            "MAX(sort_order)",
            Some("kind = ?"),
            None,
        ))
        .bind(kind.as_str())
        .bind(scope.owner_id())
        .fetch_one(self.pool)
        .await?;
        let sort_order = last.map(|p| p + 1).unwrap_or(0);

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO sections (owner_id, kind, sort_order, active, certificate, payload, created_at, updated_at)
            VALUES (?, ?, ?, TRUE, NULL, ?, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .bind(sort_order)
        .bind(serde_json::to_string(&payload)?)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        app_log!(
            info,
            "Created {} section {} for user {}",
            kind,
            result.last_insert_rowid(),
            owner_id
        );

        Ok(Section {
            id: result.last_insert_rowid(),
            owner_id,
            sort_order,
            active: true,
            certificate: None,
            payload,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn update_section(
        &self,
        owner_id: i64,
        kind: SectionKind,
        id: i64,
        changes: SectionChanges,
    ) -> Result<Option<Section>> {
        let Some(mut section) = self.get_section(owner_id, kind, id).await? else {
            return Ok(None);
        };

        if let Some(payload) = changes.payload {
            if payload.kind() != kind {
                anyhow::bail!("Cannot change section {} from {} to {}", id, kind, payload.kind());
            }
            section.payload = payload;
        }
        if let Some(active) = changes.active {
            section.active = active;
        }
        if let Some(sort_order) = changes.sort_order {
            section.sort_order = sort_order;
        }
        section.updated_at = Utc::now();

        let scope = SECTIONS.scope(owner_id);
        sqlx::query(&scope.update(
            "payload = ?, active = ?, sort_order = ?, updated_at = ?",
            Some("kind = ? AND id = ?"),
        ))
        .bind(serde_json::to_string(&section.payload)?)
        .bind(section.active)
        .bind(section.sort_order)
        .bind(section.updated_at)
        .bind(kind.as_str())
        .bind(id)
        .bind(scope.owner_id())
        .execute(self.pool)
        .await?;

        Ok(Some(section))
    }

    pub async fn delete_section(&self, owner_id: i64, kind: SectionKind, id: i64) -> Result<bool> {
        let scope = SECTIONS.scope(owner_id);
        let result = sqlx::query(&scope.delete(Some("kind = ? AND id = ?")))
            .bind(kind.as_str())
            .bind(id)
            .bind(scope.owner_id())
            .execute(self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            app_log!(info, "Deleted {} section {} for user {}", kind, id, owner_id);
        }
        Ok(deleted)
    }

    /// Attach or clear the certificate reference. `false` when no such row is owned.
    pub async fn set_certificate(
        &self,
        owner_id: i64,
        kind: SectionKind,
        id: i64,
        certificate: Option<&str>,
    ) -> Result<bool> {
        if !kind.accepts_certificate() {
            anyhow::bail!("{} sections do not accept certificates", kind);
        }

        let scope = SECTIONS.scope(owner_id);
        let result = sqlx::query(&scope.update(
            "certificate = ?, updated_at = ?",
            Some("kind = ? AND id = ?"),
        ))
        .bind(certificate)
        .bind(Utc::now())
        .bind(kind.as_str())
        .bind(id)
        .bind(scope.owner_id())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Everything needed to render `user`'s CV.
    pub async fn load_document(&self, user: &User) -> Result<CvDocument> {
        let profile = self.get_profile(user.id).await?;
        let sections = self.list_sections(user.id, None).await?;
        Ok(CvDocument {
            user: user.clone(),
            profile,
            sections,
        })
    }
}
