// src/web/handlers/profile_handlers.rs
use rocket::form::Form;
use rocket::http::ContentType;
use rocket::serde::json::Json;
use rocket::State;

use super::read_upload;
use crate::app_log;
use crate::auth::AuthenticatedUser;
use crate::core::{CvRepository, Database, FsOps};
use crate::export::BlobFetcher;
use crate::media_validator::MediaValidator;
use crate::storage::content_type_for;
use crate::types::Profile;
use crate::web::types::*;

pub async fn get_profile_handler(
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Profile>>> {
    let profile = CvRepository::new(db.pool())
        .get_profile(auth.id())
        .await
        .map_err(|e| internal_error("Failed to load profile", e))?;
    Ok(Json(DataResponse::success("Profile", profile)))
}

/// Replace the profile. The photo reference is only changed through the upload route.
pub async fn update_profile_handler(
    request: Json<Profile>,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Profile>>> {
    let mut profile = request.into_inner();
    profile.validate().map_err(validation_error)?;

    let repo = CvRepository::new(db.pool());
    let current = repo
        .get_profile(auth.id())
        .await
        .map_err(|e| internal_error("Failed to load profile", e))?;
    profile.photo = current.photo;

    repo.save_profile(auth.id(), &profile)
        .await
        .map_err(|e| internal_error("Failed to save profile", e))?;

    app_log!(info, "Profile updated for {}", auth.username());
    Ok(Json(DataResponse::success("Profile updated", profile)))
}

pub async fn upload_photo_handler(
    upload: Form<UploadForm<'_>>,
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
) -> ApiResult<Json<DataResponse<StoredBlob>>> {
    let file = read_upload(&upload.file, "photo").await?;
    let kind = MediaValidator::validate_photo(&file.raw_name, &file.bytes).map_err(upload_error)?;

    let key = format!("photos/{}{}", file.stem, kind.extension());
    let stored = fetcher
        .store()
        .put(&key, file.bytes, kind.mime())
        .await
        .map_err(|e| internal_error("Failed to store photo", e.into()))?;

    CvRepository::new(db.pool())
        .set_profile_photo(auth.id(), Some(&stored))
        .await
        .map_err(|e| internal_error("Failed to save profile photo", e))?;

    app_log!(info, "Stored photo {} for {}", stored, auth.username());
    Ok(Json(DataResponse::success(
        "Photo uploaded",
        StoredBlob { key: stored },
    )))
}

pub async fn get_photo_handler(
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
) -> ApiResult<FileResponse> {
    let profile = CvRepository::new(db.pool())
        .get_profile(auth.id())
        .await
        .map_err(|e| internal_error("Failed to load profile", e))?;

    let reference = profile.photo.ok_or_else(|| not_found("Profile photo"))?;
    let fetched = fetcher
        .fetch(&reference)
        .await
        .ok_or_else(|| not_found("Profile photo"))?;

    Ok(FileResponse {
        data: fetched.bytes,
        content_type: ContentType::parse_flexible(content_type_for(&reference))
            .unwrap_or(ContentType::Binary),
        filename: FsOps::basename(&reference).to_string(),
        attachment: false,
    })
}
