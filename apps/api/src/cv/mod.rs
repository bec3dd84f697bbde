//! CV text extraction. The text is returned to the client, which keeps it with the
//! user's other preferences and sends it back with each email request.

use axum::extract::{Multipart, State};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CvTextResponse {
    pub file_name: String,
    pub text: String,
    pub chars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CvFormat {
    Pdf,
    PlainText,
}

fn detect_format(file_name: &str, content_type: Option<&str>, bytes: &[u8]) -> Option<CvFormat> {
    let name = file_name.to_ascii_lowercase();
    let content_type = content_type.unwrap_or_default();

    if content_type == "application/pdf" || name.ends_with(".pdf") || bytes.starts_with(b"%PDF") {
        Some(CvFormat::Pdf)
    } else if content_type.starts_with("text/") || name.ends_with(".txt") || name.ends_with(".md") {
        Some(CvFormat::PlainText)
    } else {
        None
    }
}

/// Extracts text from a CV upload. PDF parsing runs on the blocking pool.
pub async fn extract_cv_text(
    file_name: &str,
    content_type: Option<&str>,
    bytes: Bytes,
) -> Result<String, AppError> {
    let format = detect_format(file_name, content_type, &bytes).ok_or_else(|| {
        AppError::Validation("Please upload a PDF or plain-text CV".to_string())
    })?;

    let text = match format {
        CvFormat::PlainText => String::from_utf8(bytes.to_vec())
            .map_err(|_| AppError::UnprocessableEntity("CV is not valid UTF-8 text".to_string()))?,
        CvFormat::Pdf => {
            let joined =
                tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                    .await;
            match joined {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(error = %e, "PDF text extraction failed");
                    return Err(AppError::UnprocessableEntity(
                        "Could not read text from the PDF".to_string(),
                    ));
                }
                // pdf-extract panics on some malformed documents.
                Err(e) if e.is_panic() => {
                    warn!("PDF text extraction panicked");
                    return Err(AppError::UnprocessableEntity(
                        "Could not read text from the PDF".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(AppError::Internal(anyhow::anyhow!(
                        "spawn_blocking failed in CV extraction: {e}"
                    )));
                }
            }
        }
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "The CV does not contain any extractable text".to_string(),
        ));
    }
    Ok(text)
}

/// POST /api/v1/cv/extract
///
/// Multipart upload with a single `cv` part.
pub async fn handle_extract_cv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CvTextResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some("cv") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("cv").to_string();
        let content_type = field.content_type().map(String::from);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Unreadable CV upload: {e}")))?;

        if bytes.len() > state.config.max_attachment_bytes {
            return Err(AppError::Validation(format!(
                "CV must be smaller than {} bytes",
                state.config.max_attachment_bytes
            )));
        }

        let text = extract_cv_text(&file_name, content_type.as_deref(), bytes).await?;
        info!(file_name = %file_name, chars = text.chars().count(), "Extracted CV text");

        return Ok(Json(CvTextResponse {
            chars: text.chars().count(),
            file_name,
            text,
        }));
    }

    Err(AppError::Validation("Missing 'cv' upload".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("cv.PDF", None, b""), Some(CvFormat::Pdf));
        assert_eq!(detect_format("cv", Some("application/pdf"), b""), Some(CvFormat::Pdf));
        assert_eq!(detect_format("upload", None, b"%PDF-1.7"), Some(CvFormat::Pdf));
        assert_eq!(detect_format("cv.txt", None, b"hi"), Some(CvFormat::PlainText));
        assert_eq!(detect_format("cv", Some("text/markdown"), b"hi"), Some(CvFormat::PlainText));
        assert_eq!(detect_format("cv.docx", None, b"PK"), None);
    }

    #[tokio::test]
    async fn test_plain_text_cv_is_trimmed() {
        let text = extract_cv_text("cv.txt", None, Bytes::from_static(b"  Rust engineer\n"))
            .await
            .unwrap();
        assert_eq!(text, "Rust engineer");
    }

    #[tokio::test]
    async fn test_unsupported_format_is_validation_error() {
        let result = extract_cv_text("cv.docx", None, Bytes::from_static(b"PK\x03\x04")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_empty_text_cv_is_unprocessable() {
        let result = extract_cv_text("cv.txt", None, Bytes::from_static(b"   ")).await;
        assert!(matches!(result, Err(AppError::UnprocessableEntity(_))));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_unprocessable() {
        let result =
            extract_cv_text("cv.pdf", None, Bytes::from_static(b"%PDF-1.4 not really")).await;
        assert!(matches!(result, Err(AppError::UnprocessableEntity(_))));
    }
}
