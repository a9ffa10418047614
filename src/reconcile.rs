// src/reconcile.rs
//! Move legacy local media into the blob store.
//!
//! A reference that already contains a UUID, or that the store already
//! holds, is left alone. Everything else is read from `media_root`, uploaded under a
//! fresh `<prefix>/<uuid><ext>` key and the stored reference is rewritten.
//! Running twice migrates nothing the second time.

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use crate::app_log;
use crate::core::{CvRepository, FsOps, UserRepository};
use crate::media_validator::sniff_image;
use crate::storage::{content_type_for, BlobStore};
use crate::types::{SectionKind, User};

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}")
        .unwrap_or_else(|e| unreachable!("invalid UUID pattern: {}", e))
});

/// True when `reference` was produced by the store and needs no migration.
pub fn is_store_key(reference: &str) -> bool {
    UUID_PATTERN.is_match(&reference.to_ascii_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileTarget {
    Photos,
    Experience,
    Course,
    Recommendation,
}

impl ReconcileTarget {
    pub const ALL: [ReconcileTarget; 4] = [
        ReconcileTarget::Photos,
        ReconcileTarget::Experience,
        ReconcileTarget::Course,
        ReconcileTarget::Recommendation,
    ];

    fn section_kind(&self) -> Option<SectionKind> {
        match self {
            ReconcileTarget::Photos => None,
            ReconcileTarget::Experience => Some(SectionKind::Experience),
            ReconcileTarget::Course => Some(SectionKind::Course),
            ReconcileTarget::Recommendation => Some(SectionKind::Recommendation),
        }
    }

    fn key_prefix(&self) -> String {
        match self.section_kind() {
            Some(kind) => kind.certificate_prefix(),
            None => "photos".to_string(),
        }
    }
}

impl fmt::Display for ReconcileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileTarget::Photos => "photos",
            ReconcileTarget::Experience => "experience",
            ReconcileTarget::Course => "course",
            ReconcileTarget::Recommendation => "recommendation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    pub dry_run: bool,
    pub only: Option<ReconcileTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    pub username: String,
    pub target: ReconcileTarget,
    pub from: String,
    /// New key; `None` in a dry run.
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub examined: usize,
    pub already_stored: usize,
    pub migrated: Vec<Migration>,
    /// References whose local file does not exist.
    pub missing: Vec<String>,
    pub failed: Vec<String>,
}

impl ReconcileReport {
    pub fn error_count(&self) -> usize {
        self.missing.len() + self.failed.len()
    }
}

pub struct Reconciler<'a> {
    pool: &'a SqlitePool,
    store: &'a dyn BlobStore,
    media_root: &'a Path,
}

impl<'a> Reconciler<'a> {
    pub fn new(pool: &'a SqlitePool, store: &'a dyn BlobStore, media_root: &'a Path) -> Self {
        Self {
            pool,
            store,
            media_root,
        }
    }

    pub async fn run(&self, options: ReconcileOptions) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            dry_run: options.dry_run,
            ..Default::default()
        };
        let targets: Vec<ReconcileTarget> = match options.only {
            Some(target) => vec![target],
            None => ReconcileTarget::ALL.to_vec(),
        };

        app_log!(
            info,
            "Reconciling {:?} into {} store (dry run: {})",
            targets,
            self.store.name(),
            options.dry_run
        );

        let users = UserRepository::new(self.pool).list_all().await?;
        for user in &users {
            for target in &targets {
                match target.section_kind() {
                    None => self.reconcile_photo(user, options, &mut report).await?,
                    Some(kind) => {
                        self.reconcile_certificates(user, *target, kind, options, &mut report)
                            .await?
                    }
                }
            }
        }

        app_log!(
            info,
            "Reconciliation finished: {} examined, {} migrated, {} already stored, {} errors",
            report.examined,
            report.migrated.len(),
            report.already_stored,
            report.error_count()
        );
        Ok(report)
    }

    async fn reconcile_photo(
        &self,
        user: &User,
        options: ReconcileOptions,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let repo = CvRepository::new(self.pool);
        let Some(profile) = repo.find_profile(user.id).await? else {
            return Ok(());
        };
        let Some(reference) = profile.photo.filter(|r| !r.trim().is_empty()) else {
            return Ok(());
        };

        if let Some(key) = self
            .migrate_one(user, ReconcileTarget::Photos, &reference, options, report)
            .await
        {
            repo.set_profile_photo(user.id, Some(&key)).await?;
        }
        Ok(())
    }

    async fn reconcile_certificates(
        &self,
        user: &User,
        target: ReconcileTarget,
        kind: SectionKind,
        options: ReconcileOptions,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let repo = CvRepository::new(self.pool);
        for section in repo.list_sections(user.id, Some(kind)).await? {
            let Some(reference) = section.certificate.filter(|r| !r.trim().is_empty()) else {
                continue;
            };
            if let Some(key) = self
                .migrate_one(user, target, &reference, options, report)
                .await
            {
                repo.set_certificate(user.id, kind, section.id, Some(&key))
                    .await?;
            }
        }
        Ok(())
    }

    /// Reconcile keys, and keys written by [`BlobStore::put`], are already in the store.
    async fn is_stored(&self, reference: &str) -> bool {
        if is_store_key(reference) {
            return true;
        }
        match self.store.exists(reference).await {
            Ok(found) => found,
            Err(e) => {
                app_log!(warn, "Could not check {} in {} store: {}", reference, self.store.name(), e);
                false
            }
        }
    }

    /// Upload one local file. Returns the new key when the reference must be rewritten.
    async fn migrate_one(
        &self,
        user: &User,
        target: ReconcileTarget,
        reference: &str,
        options: ReconcileOptions,
        report: &mut ReconcileReport,
    ) -> Option<String> {
        report.examined += 1;
        if self.is_stored(reference).await {
            report.already_stored += 1;
            return None;
        }

        let bytes = match FsOps::safe_join(self.media_root, reference) {
            Some(path) => match FsOps::read_optional(&path).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    app_log!(warn, "{}: local file for {} not found", user.username, reference);
                    report.missing.push(reference.to_string());
                    return None;
                }
                Err(e) => {
                    app_log!(error, "{}: failed to read {}: {}", user.username, reference, e);
                    report.failed.push(reference.to_string());
                    return None;
                }
            },
            None => {
                app_log!(warn, "{}: {} is not a local media path", user.username, reference);
                report.missing.push(reference.to_string());
                return None;
            }
        };

        if options.dry_run {
            app_log!(info, "[dry run] would migrate {} for {}", reference, user.username);
            report.migrated.push(Migration {
                username: user.username.clone(),
                target,
                from: reference.to_string(),
                to: None,
            });
            return None;
        }

        let key = format!(
            "{}/{}{}",
            target.key_prefix(),
            uuid::Uuid::new_v4(),
            FsOps::extension_with_dot(reference)
        );
        let content_type = match sniff_image(&bytes) {
            Some(kind) => kind.mime(),
            None => content_type_for(reference),
        };

        match self.store.put(&key, bytes, content_type).await {
            Ok(stored) => {
                app_log!(info, "Migrated {} -> {} for {}", reference, stored, user.username);
                report.migrated.push(Migration {
                    username: user.username.clone(),
                    target,
                    from: reference.to_string(),
                    to: Some(stored.clone()),
                });
                Some(stored)
            }
            Err(e) => {
                app_log!(error, "Failed to upload {} for {}: {}", reference, user.username, e);
                report.failed.push(reference.to_string());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Database;
    use crate::storage::testing::MemoryBlobStore;
    use crate::types::{Course, Experience, Recommendation, SectionPayload};
    use tempfile::TempDir;

    const LEGACY_UUID_KEY: &str = "certificados/0b5c6d2e-8f1a-4c3b-9e7d-112233445566.pdf";

    struct Fixture {
        db: Database,
        store: MemoryBlobStore,
        media: TempDir,
        user: User,
    }

    async fn fixture() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let media = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(media.path().join("fotos")).unwrap();
        std::fs::create_dir_all(media.path().join("certificados")).unwrap();
        std::fs::write(
            media.path().join("fotos/ana.png"),
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        )
        .unwrap();
        std::fs::write(media.path().join("certificados/aws.pdf"), b"%PDF-1.4 aws").unwrap();

        let user = UserRepository::new(db.pool())
            .create("ana", "Ana", "Diaz", None)
            .await
            .unwrap();
        let repo = CvRepository::new(db.pool());
        repo.set_profile_photo(user.id, Some("fotos/ana.png"))
            .await
            .unwrap();

        let experience = repo
            .create_section(user.id, SectionPayload::Experience(Experience::default()))
            .await
            .unwrap();
        repo.set_certificate(user.id, SectionKind::Experience, experience.id, Some("certificados/aws.pdf"))
            .await
            .unwrap();

        let course = repo
            .create_section(user.id, SectionPayload::Course(Course::default()))
            .await
            .unwrap();
        repo.set_certificate(user.id, SectionKind::Course, course.id, Some("certificados/gone.pdf"))
            .await
            .unwrap();

        let recommendation = repo
            .create_section(user.id, SectionPayload::Recommendation(Recommendation::default()))
            .await
            .unwrap();
        repo.set_certificate(
            user.id,
            SectionKind::Recommendation,
            recommendation.id,
            Some(LEGACY_UUID_KEY),
        )
        .await
        .unwrap();

        Fixture {
            db,
            store: MemoryBlobStore::default(),
            media,
            user,
        }
    }

    async fn document_refs(fx: &Fixture) -> (Option<String>, Vec<Option<String>>) {
        let doc = CvRepository::new(fx.db.pool())
            .load_document(&fx.user)
            .await
            .unwrap();
        let certs = doc.sections.iter().map(|s| s.certificate.clone()).collect();
        (doc.profile.photo, certs)
    }

    #[test]
    fn test_store_key_detection() {
        assert!(is_store_key(LEGACY_UUID_KEY));
        assert!(is_store_key("photos/0B5C6D2E-8F1A-4C3B-9E7D-112233445566_1a2b3c4d.png"));
        assert!(!is_store_key("fotos/ana.png"));
        assert!(!is_store_key("photos/ana_1a2b3c4d.png"));
    }

    async fn profile_count(fx: &Fixture) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
            .fetch_one(fx.db.pool())
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn test_dry_run_never_mutates() {
        let fx = fixture().await;
        UserRepository::new(fx.db.pool())
            .create("bo", "Bo", "", None)
            .await
            .unwrap();
        let before = document_refs(&fx).await;
        let profiles_before = profile_count(&fx).await;

        let report = Reconciler::new(fx.db.pool(), &fx.store, fx.media.path())
            .run(ReconcileOptions {
                dry_run: true,
                only: None,
            })
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.examined, 4);
        assert_eq!(report.already_stored, 1);
        assert_eq!(report.migrated.len(), 2);
        assert!(report.migrated.iter().all(|m| m.to.is_none()));
        assert_eq!(report.missing, vec!["certificados/gone.pdf".to_string()]);

        assert!(fx.store.objects.lock().unwrap().is_empty());
        assert_eq!(document_refs(&fx).await, before);
        assert_eq!(profile_count(&fx).await, profiles_before);
    }

    #[tokio::test]
    async fn test_uploaded_keys_count_as_stored() {
        let fx = fixture().await;
        let key = fx
            .store
            .put("certificates/course/diploma.pdf", b"%PDF-1.4".to_vec(), "application/pdf")
            .await
            .unwrap();
        let repo = CvRepository::new(fx.db.pool());
        let course = repo
            .create_section(fx.user.id, SectionPayload::Course(Course::default()))
            .await
            .unwrap();
        repo.set_certificate(fx.user.id, SectionKind::Course, course.id, Some(&key))
            .await
            .unwrap();

        let report = Reconciler::new(fx.db.pool(), &fx.store, fx.media.path())
            .run(ReconcileOptions {
                dry_run: false,
                only: Some(ReconcileTarget::Course),
            })
            .await
            .unwrap();

        assert_eq!(report.examined, 2);
        assert_eq!(report.already_stored, 1);
        assert!(report.migrated.is_empty());
        assert_eq!(report.missing, vec!["certificados/gone.pdf".to_string()]);
        assert_eq!(report.error_count(), 1);
        assert_eq!(fx.store.objects.lock().unwrap().len(), 1);

        let stored = repo
            .get_section(fx.user.id, SectionKind::Course, course.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.certificate.as_deref(), Some(key.as_str()));
    }

    #[tokio::test]
    async fn test_run_migrates_once() {
        let fx = fixture().await;
        let reconciler = Reconciler::new(fx.db.pool(), &fx.store, fx.media.path());

        let first = reconciler.run(ReconcileOptions::default()).await.unwrap();
        assert_eq!(first.migrated.len(), 2);
        assert_eq!(fx.store.objects.lock().unwrap().len(), 2);

        let (photo, certs) = document_refs(&fx).await;
        let photo = photo.unwrap();
        assert!(photo.starts_with("photos/"));
        assert!(photo.ends_with(".png"));
        assert!(is_store_key(&photo));
        assert!(certs[0]
            .as_deref()
            .unwrap()
            .starts_with("certificates/experience/"));
        assert_eq!(certs[1].as_deref(), Some("certificados/gone.pdf"));
        assert_eq!(certs[2].as_deref(), Some(LEGACY_UUID_KEY));

        let second = reconciler.run(ReconcileOptions::default()).await.unwrap();
        assert!(second.migrated.is_empty());
        assert_eq!(second.already_stored, 3);
        assert_eq!(fx.store.objects.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_only_limits_targets() {
        let fx = fixture().await;
        let report = Reconciler::new(fx.db.pool(), &fx.store, fx.media.path())
            .run(ReconcileOptions {
                dry_run: false,
                only: Some(ReconcileTarget::Photos),
            })
            .await
            .unwrap();

        assert_eq!(report.examined, 1);
        assert_eq!(report.migrated.len(), 1);
        assert_eq!(report.migrated[0].target, ReconcileTarget::Photos);
        let (_, certs) = document_refs(&fx).await;
        assert_eq!(certs[0].as_deref(), Some("certificados/aws.pdf"));
    }
}
