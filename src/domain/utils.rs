//! Argument normalization helpers shared by the tool handlers

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::errors::AppError;

pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// Splits `data:<mime>;base64,<payload>`; bare payloads get the default mime type.
pub fn parse_inline_image(raw: &str) -> Result<InlineImage, AppError> {
    let raw = raw.trim();

    let (mime_type, payload) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or_else(|| {
                AppError::invalid_arguments(
                    "invalid_image_data",
                    "imageData data URI is missing the `,` separator",
                )
            })?;
            let mime_type = header.strip_suffix(";base64").ok_or_else(|| {
                AppError::invalid_arguments(
                    "invalid_image_data",
                    "imageData data URI must be base64 encoded",
                )
            })?;
            let mime_type = mime_type.trim();
            if mime_type.is_empty() {
                (DEFAULT_IMAGE_MIME_TYPE, payload)
            } else {
                (mime_type, payload)
            }
        }
        None => (DEFAULT_IMAGE_MIME_TYPE, raw),
    };

    let payload: String = payload.chars().filter(|ch| !ch.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(AppError::invalid_arguments(
            "invalid_image_data",
            "imageData payload is empty",
        ));
    }

    STANDARD.decode(&payload).map_err(|err| {
        AppError::invalid_arguments(
            "invalid_image_data",
            format!("imageData is not valid base64: {err}"),
        )
    })?;

    Ok(InlineImage {
        mime_type: mime_type.to_ascii_lowercase(),
        data: payload,
    })
}

/// Treats blank strings as absent.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
