// src/export/pipeline.rs
//! The export pass: render the CV, append certificates, produce one PDF.
//!
//! Stages run strictly in sequence. Only a render failure aborts; a
//! certificate that cannot be fetched or parsed is skipped and reported.

use serde::Serialize;

use super::fetcher::BlobFetcher;
use super::html::{render_cv_html, HtmlVariant};
use super::merger::{MergeError, PdfMerger};
use super::renderer::Renderer;
use super::ExportError;
use crate::app_log;
use crate::environment::SiteConfig;
use crate::types::{CvDocument, SectionKind};
use crate::utils::sanitize_filename;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRef {
    pub kind: SectionKind,
    pub section_id: i64,
    pub reference: String,
}

/// One export call's input. Built per request and never stored.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub username: String,
    pub document: CvDocument,
    /// Experience, then course, then recommendation certificates, each in stored order.
    pub certificates: Vec<CertificateRef>,
}

impl ExportRequest {
    pub fn from_document(document: CvDocument) -> Self {
        let certificates = SectionKind::CERTIFIED
            .iter()
            .flat_map(|kind| document.sections_of(*kind))
            .filter_map(|section| {
                let reference = section.certificate.as_deref()?.trim();
                if reference.is_empty() {
                    return None;
                }
                Some(CertificateRef {
                    kind: section.kind(),
                    section_id: section.id,
                    reference: reference.to_string(),
                })
            })
            .collect();

        Self {
            username: document.user.username.clone(),
            document,
            certificates,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExportStage {
    Pending,
    Rendering,
    Merging,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    NotFound,
    Unparsable,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCertificate {
    pub reference: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    /// `None` when the rendered CV could not be parsed and is returned as-is.
    pub page_count: Option<usize>,
    pub cv_pages: Option<usize>,
    pub certificates_added: usize,
    pub skipped: Vec<SkippedCertificate>,
    pub filename: String,
}

pub fn combined_filename(username: &str) -> String {
    format!("CV_and_Certificates_{}.pdf", sanitize_filename(username))
}

pub fn cv_only_filename(username: &str) -> String {
    format!("CV_{}.pdf", sanitize_filename(username))
}

pub struct ExportPipeline<'a> {
    fetcher: &'a BlobFetcher,
    renderer: &'a dyn Renderer,
    site: &'a SiteConfig,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(fetcher: &'a BlobFetcher, renderer: &'a dyn Renderer, site: &'a SiteConfig) -> Self {
        Self {
            fetcher,
            renderer,
            site,
        }
    }

    fn enter(stage: &mut ExportStage, next: ExportStage) {
        app_log!(debug, "Export stage {:?} -> {:?}", stage, next);
        *stage = next;
    }

    pub async fn run(&self, request: ExportRequest) -> Result<AssembledDocument, ExportError> {
        let mut stage = ExportStage::Pending;

        Self::enter(&mut stage, ExportStage::Rendering);
        let photo = match request.document.profile.photo.as_deref() {
            Some(reference) => self.fetcher.fetch(reference).await.map(|f| f.bytes),
            None => None,
        };
        let html = render_cv_html(&request.document, self.site, photo.as_deref(), HtmlVariant::Pdf);
        let cv_bytes = self.renderer.render(&html).await.map_err(|e| {
            app_log!(error, "CV render failed for {}: {}", request.username, e);
            e
        })?;

        Self::enter(&mut stage, ExportStage::Merging);
        let mut merger = PdfMerger::new();
        let cv_pages = match merger.append(&cv_bytes) {
            Ok(pages) => pages,
            Err(e) => {
                app_log!(
                    warn,
                    "Rendered CV for {} is not mergeable ({}); returning CV only",
                    request.username,
                    e
                );
                Self::enter(&mut stage, ExportStage::Done);
                return Ok(AssembledDocument {
                    bytes: cv_bytes,
                    page_count: None,
                    cv_pages: None,
                    certificates_added: 0,
                    skipped: Vec::new(),
                    filename: cv_only_filename(&request.username),
                });
            }
        };

        let mut certificates_added = 0;
        let mut skipped = Vec::new();
        for certificate in &request.certificates {
            let reason = match self.fetcher.fetch(&certificate.reference).await {
                None => SkipReason::NotFound,
                Some(fetched) => match merger.append(&fetched.bytes) {
                    Ok(pages) => {
                        certificates_added += 1;
                        app_log!(
                            info,
                            "Appended {} certificate {} ({} pages, from {:?})",
                            certificate.kind,
                            certificate.reference,
                            pages,
                            fetched.source
                        );
                        continue;
                    }
                    Err(MergeError::NoPages) => SkipReason::Empty,
                    Err(_) => SkipReason::Unparsable,
                },
            };

            app_log!(
                warn,
                "Skipping {} certificate {}: {:?}",
                certificate.kind,
                certificate.reference,
                reason
            );
            skipped.push(SkippedCertificate {
                reference: certificate.reference.clone(),
                reason,
            });
        }

        let page_count = merger.page_count();
        let bytes = merger
            .finish()
            .map_err(|e| ExportError::Output(e.to_string()))?;

        Self::enter(&mut stage, ExportStage::Done);
        app_log!(
            info,
            "Export for {} done: {} pages, {} certificates added, {} skipped",
            request.username,
            page_count,
            certificates_added,
            skipped.len()
        );

        Ok(AssembledDocument {
            bytes,
            page_count: Some(page_count),
            cv_pages: Some(cv_pages),
            certificates_added,
            skipped,
            filename: combined_filename(&request.username),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::{
        blank_pdf, labeled_pdf, page_labels, FailingRenderer, StaticRenderer,
    };
    use crate::export::merger::page_count;
    use crate::storage::testing::MemoryBlobStore;
    use crate::types::{
        Course, Experience, Profile, Recommendation, Section, SectionPayload, Skill, User,
    };
    use chrono::Utc;
    use std::sync::Arc;

    fn section(id: i64, payload: SectionPayload, certificate: Option<&str>) -> Section {
        Section {
            id,
            owner_id: 1,
            sort_order: 0,
            active: true,
            certificate: certificate.map(str::to_string),
            payload,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn document(sections: Vec<Section>) -> CvDocument {
        CvDocument {
            user: User {
                id: 1,
                username: "marti".to_string(),
                first_name: "Marti".to_string(),
                last_name: "Ops".to_string(),
                email: None,
                is_active: true,
                created_at: Utc::now(),
            },
            profile: Profile::default(),
            sections,
        }
    }

    fn experience(id: i64, certificate: Option<&str>) -> Section {
        section(
            id,
            SectionPayload::Experience(Experience::default()),
            certificate,
        )
    }

    fn course(id: i64, certificate: Option<&str>) -> Section {
        section(id, SectionPayload::Course(Course::default()), certificate)
    }

    fn fetcher(objects: &[(&str, Vec<u8>)]) -> (BlobFetcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryBlobStore::with(objects));
        (BlobFetcher::new(store, dir.path().to_path_buf()), dir)
    }

    #[test]
    fn test_request_orders_certificates_by_kind() {
        let doc = document(vec![
            section(
                1,
                SectionPayload::Recommendation(Recommendation::default()),
                Some("r.pdf"),
            ),
            course(2, Some("c.pdf")),
            experience(3, Some("e.pdf")),
            experience(4, Some("  ")),
            section(
                5,
                SectionPayload::Skill(Skill::default()),
                Some("ignored.pdf"),
            ),
        ]);

        let request = ExportRequest::from_document(doc);
        let refs: Vec<_> = request
            .certificates
            .iter()
            .map(|c| c.reference.as_str())
            .collect();
        assert_eq!(refs, vec!["e.pdf", "c.pdf", "r.pdf"]);
        assert_eq!(request.username, "marti");
    }

    #[tokio::test]
    async fn test_no_certificates_keeps_cv_pages() {
        let (fetcher, _dir) = fetcher(&[]);
        let renderer = StaticRenderer(blank_pdf(2));
        let site = SiteConfig::default();
        let pipeline = ExportPipeline::new(&fetcher, &renderer, &site);

        let doc = pipeline
            .run(ExportRequest::from_document(document(vec![])))
            .await
            .unwrap();
        assert_eq!(doc.page_count, Some(2));
        assert_eq!(page_count(&doc.bytes).unwrap(), 2);
        assert_eq!(doc.filename, "CV_and_Certificates_marti.pdf");
    }

    #[tokio::test]
    async fn test_cv_pages_come_first_then_certificates_by_kind() {
        let (fetcher, _dir) = fetcher(&[
            ("e1.pdf", labeled_pdf("experience-a", 1)),
            ("e2.pdf", labeled_pdf("experience-b", 2)),
            ("c.pdf", labeled_pdf("course", 1)),
            ("r.pdf", labeled_pdf("recommendation", 1)),
        ]);
        let renderer = StaticRenderer(labeled_pdf("cv", 2));
        let site = SiteConfig::default();
        let pipeline = ExportPipeline::new(&fetcher, &renderer, &site);

        let doc = pipeline
            .run(ExportRequest::from_document(document(vec![
                section(
                    1,
                    SectionPayload::Recommendation(Recommendation::default()),
                    Some("r.pdf"),
                ),
                course(2, Some("c.pdf")),
                experience(3, Some("e1.pdf")),
                experience(4, Some("e2.pdf")),
            ])))
            .await
            .unwrap();

        assert_eq!(doc.certificates_added, 4);
        assert_eq!(
            page_labels(&doc.bytes),
            vec![
                "cv 1",
                "cv 2",
                "experience-a 1",
                "experience-b 1",
                "experience-b 2",
                "course 1",
                "recommendation 1"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_certificate_is_skipped() {
        // Two experiences (one with a 3-page certificate, one without) and a
        // course whose certificate is missing: CV pages + 3.
        let (fetcher, _dir) = fetcher(&[("certificates/experience/e.pdf", blank_pdf(3))]);
        let renderer = StaticRenderer(blank_pdf(2));
        let site = SiteConfig::default();
        let pipeline = ExportPipeline::new(&fetcher, &renderer, &site);

        let request = ExportRequest::from_document(document(vec![
            experience(1, Some("certificates/experience/e.pdf")),
            experience(2, None),
            course(3, Some("certificates/course/gone.pdf")),
        ]));

        let first = pipeline.run(request.clone()).await.unwrap();
        assert_eq!(first.page_count, Some(5));
        assert_eq!(first.cv_pages, Some(2));
        assert_eq!(first.certificates_added, 1);
        assert_eq!(
            first.skipped,
            vec![SkippedCertificate {
                reference: "certificates/course/gone.pdf".to_string(),
                reason: SkipReason::NotFound,
            }]
        );
        assert_eq!(page_count(&first.bytes).unwrap(), 5);

        let second = pipeline.run(request).await.unwrap();
        assert_eq!(second.page_count, first.page_count);
    }

    #[tokio::test]
    async fn test_unparsable_and_empty_certificates() {
        let (fetcher, _dir) = fetcher(&[
            ("bad.pdf", b"%PDF-1.4 not really".to_vec()),
            ("empty.pdf", blank_pdf(0)),
            ("good.pdf", blank_pdf(1)),
        ]);
        let renderer = StaticRenderer(blank_pdf(1));
        let site = SiteConfig::default();
        let pipeline = ExportPipeline::new(&fetcher, &renderer, &site);

        let doc = pipeline
            .run(ExportRequest::from_document(document(vec![
                experience(1, Some("bad.pdf")),
                experience(2, Some("empty.pdf")),
                course(3, Some("good.pdf")),
            ])))
            .await
            .unwrap();

        assert_eq!(doc.page_count, Some(2));
        let reasons: Vec<_> = doc.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec![SkipReason::Unparsable, SkipReason::Empty]);
    }

    #[tokio::test]
    async fn test_render_failure_is_fatal() {
        let (fetcher, _dir) = fetcher(&[]);
        let site = SiteConfig::default();
        let pipeline = ExportPipeline::new(&fetcher, &FailingRenderer, &site);

        let err = pipeline
            .run(ExportRequest::from_document(document(vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Render(_)));
    }

    #[tokio::test]
    async fn test_unreadable_cv_is_returned_alone() {
        let (fetcher, _dir) = fetcher(&[("e.pdf", blank_pdf(1))]);
        let renderer = StaticRenderer(b"%PDF-1.7 opaque".to_vec());
        let site = SiteConfig::default();
        let pipeline = ExportPipeline::new(&fetcher, &renderer, &site);

        let doc = pipeline
            .run(ExportRequest::from_document(document(vec![experience(
                1,
                Some("e.pdf"),
            )])))
            .await
            .unwrap();
        assert_eq!(doc.bytes, b"%PDF-1.7 opaque");
        assert_eq!(doc.page_count, None);
        assert_eq!(doc.filename, "CV_marti.pdf");
    }
}
