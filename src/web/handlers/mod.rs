pub mod cv_handlers;
pub mod profile_handlers;
pub mod section_handlers;
pub mod system_handlers;

pub use cv_handlers::*;
pub use profile_handlers::*;
pub use section_handlers::*;
pub use system_handlers::*;

use rocket::fs::TempFile;
use rocket::http::Status;
use tokio::io::AsyncReadExt;

use crate::app_log;
use crate::web::types::{api_error, ApiResult};

/// An uploaded file read fully into memory.
pub struct Upload {
    /// Client-supplied file name, used only for the extension check.
    pub raw_name: String,
    /// Sanitized stem used to build the storage key.
    pub stem: String,
    pub bytes: Vec<u8>,
}

pub async fn read_upload(file: &TempFile<'_>, fallback_stem: &str) -> ApiResult<Upload> {
    let raw_name = file
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .unwrap_or_default();
    let stem = file
        .name()
        .filter(|name| !name.is_empty())
        .unwrap_or(fallback_stem)
        .to_string();

    let mut bytes = Vec::with_capacity(file.len() as usize);
    let reader = file.open().await.map_err(|e| {
        app_log!(error, "Failed to open upload {}: {}", raw_name, e);
        api_error(
            Status::InternalServerError,
            "Failed to read uploaded file",
            "UPLOAD_ERROR",
            &["Try uploading the file again"],
        )
    })?;
    tokio::pin!(reader);
    reader.read_to_end(&mut bytes).await.map_err(|e| {
        app_log!(error, "Failed to read upload {}: {}", raw_name, e);
        api_error(
            Status::InternalServerError,
            "Failed to read uploaded file",
            "UPLOAD_ERROR",
            &["Try uploading the file again"],
        )
    })?;

    Ok(Upload {
        raw_name,
        stem,
        bytes,
    })
}
