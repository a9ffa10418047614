// src/media_validator.rs
//! Upload checks for profile photos and certificate PDFs.

use crate::core::config_manager::MAX_UPLOAD_BYTES;
use crate::core::FsOps;

const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const PDF_SIGNATURE: &[u8] = b"%PDF-";

#[derive(Debug, Clone)]
pub struct MediaValidationError {
    pub file_name: String,
    pub error_type: MediaErrorType,
    pub message: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorType {
    EmptyFile,
    TooLarge,
    WrongFormat,
    CorruptedFile,
}

impl MediaErrorType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyFile => "MEDIA_EMPTY",
            Self::TooLarge => "MEDIA_TOO_LARGE",
            Self::WrongFormat => "MEDIA_WRONG_FORMAT",
            Self::CorruptedFile => "MEDIA_CORRUPTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => ".png",
            ImageKind::Jpeg => ".jpg",
        }
    }
}

/// Detect PNG or JPEG from magic bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageKind> {
    if bytes.starts_with(PNG_SIGNATURE) {
        Some(ImageKind::Png)
    } else if bytes.starts_with(JPEG_SIGNATURE) {
        Some(ImageKind::Jpeg)
    } else {
        None
    }
}

pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_SIGNATURE)
}

pub struct MediaValidator;

impl MediaValidator {
    fn error(
        file_name: &str,
        error_type: MediaErrorType,
        message: impl Into<String>,
        suggestion: &str,
    ) -> MediaValidationError {
        MediaValidationError {
            file_name: file_name.to_string(),
            error_type,
            message: message.into(),
            suggestion: suggestion.to_string(),
        }
    }

    fn check_size(file_name: &str, bytes: &[u8]) -> Result<(), MediaValidationError> {
        if bytes.is_empty() {
            return Err(Self::error(
                file_name,
                MediaErrorType::EmptyFile,
                "Uploaded file is empty",
                "Please upload a non-empty file",
            ));
        }
        if bytes.len() as u64 > MAX_UPLOAD_BYTES {
            return Err(Self::error(
                file_name,
                MediaErrorType::TooLarge,
                format!(
                    "File too large: {:.1}MB (max 10MB)",
                    bytes.len() as f64 / 1024.0 / 1024.0
                ),
                "Please compress the file and try again",
            ));
        }
        Ok(())
    }

    /// Profile photos must be PNG or JPEG, with an extension matching the content.
    pub fn validate_photo(file_name: &str, bytes: &[u8]) -> Result<ImageKind, MediaValidationError> {
        Self::check_size(file_name, bytes)?;

        let Some(kind) = sniff_image(bytes) else {
            return Err(Self::error(
                file_name,
                MediaErrorType::CorruptedFile,
                "Not a valid PNG or JPEG image",
                "Please upload a PNG or JPEG photo",
            ));
        };

        match (FsOps::extension_with_dot(file_name).as_str(), kind) {
            ("", _) | (".png", ImageKind::Png) | (".jpg" | ".jpeg", ImageKind::Jpeg) => Ok(kind),
            (".png", ImageKind::Jpeg) => Err(Self::error(
                file_name,
                MediaErrorType::WrongFormat,
                "File is JPEG but has .png extension",
                "Please rename file to .jpg extension or convert to PNG format",
            )),
            (".jpg" | ".jpeg", ImageKind::Png) => Err(Self::error(
                file_name,
                MediaErrorType::WrongFormat,
                "File is PNG but has .jpg/.jpeg extension",
                "Please rename file to .png extension or convert to JPEG format",
            )),
            (other, _) => Err(Self::error(
                file_name,
                MediaErrorType::WrongFormat,
                format!("Unsupported image extension: {}", other),
                "Please use PNG or JPEG format only",
            )),
        }
    }

    pub fn validate_certificate(file_name: &str, bytes: &[u8]) -> Result<(), MediaValidationError> {
        Self::check_size(file_name, bytes)?;
        if !looks_like_pdf(bytes) {
            return Err(Self::error(
                file_name,
                MediaErrorType::WrongFormat,
                "Certificate is not a PDF document",
                "Please upload the certificate as a PDF file",
            ));
        }
        Ok(())
    }
}
