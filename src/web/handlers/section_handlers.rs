// src/web/handlers/section_handlers.rs
use rocket::form::Form;
use rocket::http::{ContentType, Status};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::State;

use super::read_upload;
use crate::app_log;
use crate::auth::AuthenticatedUser;
use crate::core::cv_repository::SectionChanges;
use crate::core::{CvRepository, Database, FsOps};
use crate::export::BlobFetcher;
use crate::media_validator::MediaValidator;
use crate::storage::content_type_for;
use crate::types::{Section, SectionKind};
use crate::web::types::*;

fn certified_kind(kind: &str) -> ApiResult<SectionKind> {
    let kind = parse_kind(kind)?;
    if !kind.accepts_certificate() {
        return Err(validation_error(format!(
            "{} sections do not accept certificates",
            kind
        )));
    }
    Ok(kind)
}

pub async fn list_sections_handler(
    kind: &str,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Vec<Section>>>> {
    let kind = parse_kind(kind)?;
    let sections = CvRepository::new(db.pool())
        .list_sections(auth.id(), Some(kind))
        .await
        .map_err(|e| internal_error("Failed to list sections", e))?;
    Ok(Json(DataResponse::success(
        format!("{} {} sections", sections.len(), kind),
        sections,
    )))
}

pub async fn create_section_handler(
    kind: &str,
    request: Json<SectionInput>,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Custom<Json<DataResponse<Section>>>> {
    let kind = parse_kind(kind)?;
    let changes = request.into_inner().into_changes(kind).map_err(validation_error)?;
    let Some(payload) = changes.payload else {
        return Err(validation_error("Section body is required"));
    };

    let repo = CvRepository::new(db.pool());
    let mut section = repo
        .create_section(auth.id(), payload)
        .await
        .map_err(|e| internal_error("Failed to create section", e))?;

    if changes.active.is_some() || changes.sort_order.is_some() {
        let bookkeeping = SectionChanges {
            payload: None,
            active: changes.active,
            sort_order: changes.sort_order,
        };
        section = repo
            .update_section(auth.id(), kind, section.id, bookkeeping)
            .await
            .map_err(|e| internal_error("Failed to create section", e))?
            .ok_or_else(|| not_found("Section"))?;
    }

    Ok(Custom(
        Status::Created,
        Json(DataResponse::success(format!("Created {} section", kind), section)),
    ))
}

pub async fn get_section_handler(
    kind: &str,
    id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Section>>> {
    let kind = parse_kind(kind)?;
    let section = CvRepository::new(db.pool())
        .get_section(auth.id(), kind, id)
        .await
        .map_err(|e| internal_error("Failed to load section", e))?
        .ok_or_else(|| not_found("Section"))?;
    Ok(Json(DataResponse::success(section.payload.title(), section)))
}

pub async fn update_section_handler(
    kind: &str,
    id: i64,
    request: Json<SectionInput>,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Section>>> {
    let kind = parse_kind(kind)?;
    let repo = CvRepository::new(db.pool());
    repo.get_section(auth.id(), kind, id)
        .await
        .map_err(|e| internal_error("Failed to load section", e))?
        .ok_or_else(|| not_found("Section"))?;

    let changes = request.into_inner().into_changes(kind).map_err(validation_error)?;
    let section = repo
        .update_section(auth.id(), kind, id, changes)
        .await
        .map_err(|e| internal_error("Failed to update section", e))?
        .ok_or_else(|| not_found("Section"))?;

    app_log!(info, "Updated {} section {} for {}", kind, id, auth.username());
    Ok(Json(DataResponse::success("Section updated", section)))
}

pub async fn delete_section_handler(
    kind: &str,
    id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<ActionResponse>> {
    let kind = parse_kind(kind)?;
    let deleted = CvRepository::new(db.pool())
        .delete_section(auth.id(), kind, id)
        .await
        .map_err(|e| internal_error("Failed to delete section", e))?;

    if !deleted {
        return Err(not_found("Section"));
    }
    Ok(Json(ActionResponse::success(
        format!("Deleted {} section {}", kind, id),
        "deleted",
    )))
}

pub async fn upload_certificate_handler(
    kind: &str,
    id: i64,
    upload: Form<UploadForm<'_>>,
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
) -> ApiResult<Json<DataResponse<StoredBlob>>> {
    let kind = certified_kind(kind)?;
    let repo = CvRepository::new(db.pool());

    // Check ownership before anything is written to the store.
    repo.get_section(auth.id(), kind, id)
        .await
        .map_err(|e| internal_error("Failed to load section", e))?
        .ok_or_else(|| not_found("Section"))?;

    let file = read_upload(&upload.file, "certificate").await?;
    MediaValidator::validate_certificate(&file.raw_name, &file.bytes).map_err(upload_error)?;

    let key = format!("{}/{}.pdf", kind.certificate_prefix(), file.stem);
    let stored = fetcher
        .store()
        .put(&key, file.bytes, "application/pdf")
        .await
        .map_err(|e| internal_error("Failed to store certificate", e.into()))?;

    let attached = repo
        .set_certificate(auth.id(), kind, id, Some(&stored))
        .await
        .map_err(|e| internal_error("Failed to attach certificate", e))?;
    if !attached {
        return Err(not_found("Section"));
    }

    app_log!(
        info,
        "Attached certificate {} to {} section {} of {}",
        stored,
        kind,
        id,
        auth.username()
    );
    Ok(Json(DataResponse::success(
        "Certificate uploaded",
        StoredBlob { key: stored },
    )))
}

/// Download one section's certificate, trying the older per-kind key layouts too.
pub async fn download_certificate_handler(
    kind: &str,
    id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
) -> ApiResult<FileResponse> {
    let kind = certified_kind(kind)?;
    let section = CvRepository::new(db.pool())
        .get_section(auth.id(), kind, id)
        .await
        .map_err(|e| internal_error("Failed to load section", e))?
        .ok_or_else(|| not_found("Section"))?;

    let reference = section
        .certificate
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| not_found("Certificate"))?;
    let basename = FsOps::basename(&reference).to_string();

    let fetched = fetcher
        .fetch_with_candidates(&reference, &kind.legacy_certificate_keys(&basename))
        .await
        .ok_or_else(|| {
            app_log!(warn, "Certificate {} of {} section {} not found", reference, kind, id);
            not_found("Certificate")
        })?;

    Ok(FileResponse {
        data: fetched.bytes,
        content_type: ContentType::parse_flexible(content_type_for(&basename))
            .unwrap_or(ContentType::Binary),
        filename: basename,
        attachment: true,
    })
}
