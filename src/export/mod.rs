// src/export/mod.rs
//! CV export: render to PDF, fetch certificates, merge into one document

pub mod fetcher;
pub mod html;
pub mod merger;
pub mod pipeline;
pub mod renderer;

pub use fetcher::{BlobFetcher, Fetched, ResolvedFrom};
pub use html::{render_cv_html, HtmlVariant};
pub use merger::{MergeError, PdfMerger};
pub use pipeline::{
    AssembledDocument, CertificateRef, ExportPipeline, ExportRequest, ExportStage, SkipReason,
    SkippedCertificate,
};
pub use renderer::{CommandRenderer, Renderer};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CV rendering failed: {0}")]
    Render(String),
    #[error("failed to write export: {0}")]
    Output(String),
}
