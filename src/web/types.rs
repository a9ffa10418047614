// src/web/types.rs
use rocket::form::FromForm;
use rocket::fs::TempFile;
use rocket::http::{ContentType, Status};
use rocket::response::status::Custom;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{Request, Response};
use std::sync::Arc;

use crate::app_log;
use crate::auth::AuthError;
use crate::core::cv_repository::SectionChanges;
use crate::core::Database;
use crate::core::config_manager::AuthSettings;
use crate::environment::SiteConfig;
use crate::export::{BlobFetcher, Renderer};
use crate::media_validator::MediaValidationError;
use crate::types::{SectionKind, SectionPayload};

/// Shared, immutable server state. Each field is managed separately.
pub struct AppState {
    pub db: Database,
    pub auth: AuthSettings,
    pub site: SiteConfig,
    pub fetcher: BlobFetcher,
    pub renderer: Arc<dyn Renderer>,
}

// ===== Binary responses =====

pub struct PdfResponse {
    pub data: Vec<u8>,
    pub filename: Option<String>,
}

impl PdfResponse {
    pub fn with_filename(data: Vec<u8>, filename: String) -> Self {
        Self {
            data,
            filename: Some(filename),
        }
    }
}

impl<'r> Responder<'r, 'static> for PdfResponse {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let mut binding = Response::build();
        let mut response = binding
            .header(ContentType::PDF)
            .sized_body(self.data.len(), std::io::Cursor::new(self.data));

        if let Some(filename) = self.filename {
            response = response.raw_header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", filename),
            );
        }

        response.ok()
    }
}

/// A stored blob sent back to the client.
pub struct FileResponse {
    pub data: Vec<u8>,
    pub content_type: ContentType,
    pub filename: String,
    pub attachment: bool,
}

impl<'r> Responder<'r, 'static> for FileResponse {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let disposition = if self.attachment { "attachment" } else { "inline" };
        Response::build()
            .header(self.content_type)
            .raw_header(
                "Content-Disposition",
                format!("{}; filename=\"{}\"", disposition, self.filename),
            )
            .sized_body(self.data.len(), std::io::Cursor::new(self.data))
            .ok()
    }
}

// ===== Forms & requests =====

#[derive(FromForm)]
pub struct UploadForm<'f> {
    pub file: TempFile<'f>,
}

/// Section body: payload fields plus optional bookkeeping. The kind comes from the path.
#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct SectionInput {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl SectionInput {
    pub fn into_changes(self, kind: SectionKind) -> Result<SectionChanges, String> {
        let mut fields = self.fields;
        fields.insert(
            "kind".to_string(),
            serde_json::Value::String(kind.as_str().to_string()),
        );
        let payload: SectionPayload = serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| format!("Invalid {} section: {}", kind, e))?;
        payload.validate()?;

        Ok(SectionChanges {
            payload: Some(payload),
            active: self.active,
            sort_order: self.sort_order,
        })
    }
}

// ===== Standard response envelopes =====

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde", rename_all = "lowercase")]
pub enum ResponseType {
    Text,
    Data,
    Action,
    Error,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct TextResponse {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub success: bool,
    pub message: String,
}

impl TextResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Text,
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct DataResponse<T> {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            response_type: ResponseType::Data,
            success: true,
            message: message.into(),
            data,
        }
    }
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ActionResponse {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub success: bool,
    pub message: String,
    pub action: String,
}

impl ActionResponse {
    pub fn success(message: impl Into<String>, action: &str) -> Self {
        Self {
            response_type: ResponseType::Action,
            success: true,
            message: message.into(),
            action: action.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct StandardErrorResponse {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub suggestions: Vec<String>,
}

impl StandardErrorResponse {
    pub fn new(error: String, error_code: String, suggestions: Vec<String>) -> Self {
        Self {
            response_type: ResponseType::Error,
            success: false,
            error,
            error_code,
            suggestions,
        }
    }
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct StoredBlob {
    pub key: String,
}

// ===== Errors with status =====

pub type ApiError = Custom<Json<StandardErrorResponse>>;
pub type ApiResult<T> = Result<T, ApiError>;

pub fn api_error(status: Status, error: impl Into<String>, code: &str, suggestions: &[&str]) -> ApiError {
    Custom(
        status,
        Json(StandardErrorResponse::new(
            error.into(),
            code.to_string(),
            suggestions.iter().map(|s| s.to_string()).collect(),
        )),
    )
}

pub fn not_found(what: &str) -> ApiError {
    api_error(
        Status::NotFound,
        format!("{} not found", what),
        "NOT_FOUND",
        &["Check the identifier and try again"],
    )
}

pub fn validation_error(message: impl Into<String>) -> ApiError {
    api_error(
        Status::BadRequest,
        message,
        "VALIDATION_ERROR",
        &["Fix the highlighted field and resubmit"],
    )
}

pub fn upload_error(error: MediaValidationError) -> ApiError {
    app_log!(warn, "Rejected upload {}: {}", error.file_name, error.message);
    Custom(
        Status::UnprocessableEntity,
        Json(StandardErrorResponse::new(
            error.message,
            error.error_type.code().to_string(),
            vec![error.suggestion],
        )),
    )
}

pub fn auth_error(error: Option<AuthError>) -> StandardErrorResponse {
    let (message, code) = match error {
        Some(e) => (e.message(), e.code()),
        None => ("Authentication required", "AUTHORIZATION_ERROR"),
    };
    StandardErrorResponse::new(
        message.to_string(),
        code.to_string(),
        vec!["Send a valid token as 'Authorization: Bearer <token>'".to_string()],
    )
}

pub fn internal_error(context: &str, error: anyhow::Error) -> ApiError {
    app_log!(error, "{}: {:#}", context, error);
    api_error(
        Status::InternalServerError,
        context.to_string(),
        "INTERNAL_ERROR",
        &["Try again in a few moments", "Contact support if the problem persists"],
    )
}

/// Parse a section kind from the path; unknown kinds are a 404.
pub fn parse_kind(kind: &str) -> ApiResult<SectionKind> {
    kind.parse::<SectionKind>()
        .map_err(|_| not_found(&format!("Section type '{}'", kind)))
}
