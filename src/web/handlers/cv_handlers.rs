// src/web/handlers/cv_handlers.rs
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket::State;
use std::sync::Arc;
use tracing::Instrument;

use crate::auth::AuthenticatedUser;
use crate::core::{CvRepository, Database};
use crate::environment::SiteConfig;
use crate::export::{
    render_cv_html, BlobFetcher, ExportError, ExportPipeline, ExportRequest, HtmlVariant, Renderer,
};
use crate::types::CvDocument;
use crate::web::types::*;
use crate::{app_log, app_span};

async fn load_document(auth: &AuthenticatedUser, db: &Database) -> ApiResult<CvDocument> {
    CvRepository::new(db.pool())
        .load_document(auth.user())
        .await
        .map_err(|e| internal_error("Failed to load CV", e))
}

pub async fn get_cv_handler(
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<CvDocument>>> {
    let document = load_document(&auth, db).await?;
    Ok(Json(DataResponse::success(
        format!("CV for {}", auth.username()),
        document,
    )))
}

pub async fn cv_html_handler(
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
    site: &State<SiteConfig>,
) -> ApiResult<RawHtml<String>> {
    let document = load_document(&auth, db).await?;
    let photo = match document.profile.photo.as_deref() {
        Some(reference) => fetcher.fetch(reference).await.map(|f| f.bytes),
        None => None,
    };
    Ok(RawHtml(render_cv_html(
        &document,
        site,
        photo.as_deref(),
        HtmlVariant::View,
    )))
}

pub async fn export_cv_handler(
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
    renderer: &State<Arc<dyn Renderer>>,
    site: &State<SiteConfig>,
) -> ApiResult<PdfResponse> {
    let span = app_span!("cv_export", user = %auth.username());

    async move {
        let document = load_document(&auth, db).await?;
        let request = ExportRequest::from_document(document);
        app_log!(
            info,
            "Exporting CV for {} with {} certificate references",
            request.username,
            request.certificates.len()
        );

        let pipeline = ExportPipeline::new(fetcher, renderer.inner().as_ref(), site);
        match pipeline.run(request).await {
            Ok(assembled) => Ok(PdfResponse::with_filename(
                assembled.bytes,
                assembled.filename,
            )),
            Err(ExportError::Render(e)) => {
                app_log!(error, "Render failed for {}: {}", auth.username(), e);
                Err(api_error(
                    Status::InternalServerError,
                    "CV rendering failed",
                    "RENDER_FAILED",
                    &["Check your CV data for unusual content", "Try again in a few moments"],
                ))
            }
            Err(e) => Err(internal_error("Failed to assemble export", e.into())),
        }
    }
    .instrument(span)
    .await
}
