//! Axum route handlers for the Email API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::email::generator::{generate_email, EmailContext, EmailDraft};
use crate::email::job_info::{extract_job_info, extract_text_from_image, JobInfo};
use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::share::codec::decode_data_url;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateEmailRequest {
    /// The user's own completion-service key; falls back to the server key.
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub job_post: Option<String>,
    pub additional_info: Option<String>,
    pub cv_text: Option<String>,
    /// Screenshot of the job post as a base64 data URL.
    pub image_data_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateEmailResponse {
    /// The job post text the email was written from (transcribed when only an image was given).
    pub job_post: String,
    pub job_info: JobInfo,
    pub email: EmailDraft,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_client(state: &AppState, request: &GenerateEmailRequest) -> Result<LlmClient, AppError> {
    let client = match non_empty(&request.api_key) {
        Some(key) => state.llm.with_api_key(key),
        None => state.llm.clone(),
    };
    if !client.has_api_key() {
        return Err(AppError::Validation(
            "An API key is required to generate an email".to_string(),
        ));
    }
    Ok(client)
}

/// POST /api/v1/email/generate
///
/// Screenshot transcription (only when no text is given) → job info → email.
pub async fn handle_generate_email(
    State(state): State<AppState>,
    Json(request): Json<GenerateEmailRequest>,
) -> Result<Json<GenerateEmailResponse>, AppError> {
    let llm = resolve_client(&state, &request)?;
    let model = non_empty(&request.model).unwrap_or(state.config.default_model.as_str());

    let job_post = match (
        non_empty(&request.job_post),
        non_empty(&request.image_data_url),
    ) {
        (Some(text), _) => text.to_string(),
        (None, Some(image)) => {
            let decoded = decode_data_url(image)
                .map_err(|e| AppError::Validation(format!("imageDataUrl is not usable: {e}")))?;
            if !decoded.mime_type.starts_with("image/") {
                return Err(AppError::Validation(format!(
                    "imageDataUrl must be an image, got {}",
                    decoded.mime_type
                )));
            }
            info!("Transcribing job post screenshot");
            extract_text_from_image(&llm, image).await?
        }
        (None, None) => {
            return Err(AppError::Validation(
                "Provide a job post or a screenshot".to_string(),
            ))
        }
    };

    let cv_text = non_empty(&request.cv_text);
    let job_info = extract_job_info(&llm, model, &job_post, cv_text).await?;

    let email = generate_email(
        &llm,
        model,
        &EmailContext {
            job_post: &job_post,
            additional_info: non_empty(&request.additional_info),
            cv_text,
            job_info: &job_info,
        },
    )
    .await?;

    info!(job_title = %job_info.job_title, "Generated application email");

    Ok(Json(GenerateEmailResponse {
        job_post,
        job_info,
        email,
    }))
}
