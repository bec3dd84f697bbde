//! Job-info extraction — pulls title, company, contact and portfolio details out of a
//! job post (and the candidate's CV) before the email is written.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::email::prompts::{
    IMAGE_TRANSCRIBE_PROMPT, JOB_INFO_CV_CONTEXT, JOB_INFO_PROMPT_TEMPLATE,
};
use crate::errors::AppError;
use crate::llm_client::prompts::{fill, JSON_ONLY_INSTRUCTION, NOT_SPECIFIED};
use crate::llm_client::{LlmClient, LlmError};

/// CV texts at or below this length are treated as a file name, not content.
pub const MIN_CV_CONTEXT_CHARS: usize = 50;

fn not_specified() -> String {
    NOT_SPECIFIED.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    #[serde(default = "not_specified")]
    pub job_title: String,
    #[serde(default = "not_specified")]
    pub company: String,
    #[serde(default = "not_specified")]
    pub location: String,
    #[serde(default = "not_specified")]
    pub job_type: String,
    #[serde(default = "not_specified")]
    pub experience: String,
    #[serde(default = "not_specified")]
    pub skills: String,
    #[serde(default = "not_specified")]
    pub recruiter_email: String,
    #[serde(default = "not_specified")]
    pub portfolio_url: String,
}

impl Default for JobInfo {
    fn default() -> Self {
        JobInfo {
            job_title: not_specified(),
            company: not_specified(),
            location: not_specified(),
            job_type: not_specified(),
            experience: not_specified(),
            skills: not_specified(),
            recruiter_email: not_specified(),
            portfolio_url: not_specified(),
        }
    }
}

fn specified(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && !value.eq_ignore_ascii_case(NOT_SPECIFIED)).then_some(value)
}

impl JobInfo {
    pub fn recruiter_email(&self) -> Option<&str> {
        specified(&self.recruiter_email)
    }

    pub fn portfolio_url(&self) -> Option<&str> {
        specified(&self.portfolio_url)
    }
}

pub fn build_job_info_prompt(job_post: &str, cv_text: Option<&str>) -> String {
    let cv_context = match cv_text {
        Some(cv) if cv.chars().count() > MIN_CV_CONTEXT_CHARS => {
            fill(JOB_INFO_CV_CONTEXT, &[("cv_text", cv)])
        }
        _ => String::new(),
    };

    fill(
        JOB_INFO_PROMPT_TEMPLATE,
        &[
            ("job_post", job_post),
            ("cv_context", &cv_context),
            ("json_only", JSON_ONLY_INSTRUCTION),
        ],
    )
}

/// Transcribes a job-post screenshot with the vision model.
pub async fn extract_text_from_image(llm: &LlmClient, data_url: &str) -> Result<String, AppError> {
    let text = llm
        .complete_vision(IMAGE_TRANSCRIBE_PROMPT, data_url)
        .await
        .map_err(|e| AppError::Llm(format!("Failed to extract text from image: {e}")))?;
    Ok(text.trim().to_string())
}

pub async fn extract_job_info(
    llm: &LlmClient,
    model: &str,
    job_post: &str,
    cv_text: Option<&str>,
) -> Result<JobInfo, AppError> {
    let prompt = build_job_info_prompt(job_post, cv_text);
    match llm.complete_json::<JobInfo>(model, &prompt).await {
        Ok(info) => Ok(info),
        // An unparseable answer yields the all-"Not specified" record.
        Err(LlmError::Parse(e)) => {
            warn!(error = %e, "Job info response was not valid JSON; using defaults");
            Ok(JobInfo::default())
        }
        Err(e) => Err(AppError::Llm(format!("Job info extraction failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::extract_json_object;

    fn parse_job_info(raw: &str) -> Result<JobInfo, serde_json::Error> {
        serde_json::from_str(extract_json_object(raw))
    }

    #[test]
    fn test_parse_job_info_full_object() {
        let raw = r#"```json
        {
            "jobTitle": "Senior Rust Engineer",
            "company": "Ferrous Labs",
            "location": "Remote",
            "jobType": "full-time",
            "experience": "5+ years",
            "skills": "Rust, Tokio, Postgres",
            "recruiterEmail": "jobs@ferrous.dev",
            "portfolioUrl": "Not specified"
        }
        ```"#;
        let info = parse_job_info(raw).unwrap();
        assert_eq!(info.job_title, "Senior Rust Engineer");
        assert_eq!(info.recruiter_email(), Some("jobs@ferrous.dev"));
        assert_eq!(info.portfolio_url(), None);
    }

    #[test]
    fn test_parse_job_info_missing_fields_default() {
        let info = parse_job_info(r#"{"jobTitle": "Designer"}"#).unwrap();
        assert_eq!(info.job_title, "Designer");
        assert_eq!(info.company, NOT_SPECIFIED);
    }

    #[test]
    fn test_parse_job_info_garbage_is_an_error() {
        assert!(parse_job_info("I could not find a job post.").is_err());
    }

    #[test]
    fn test_prompt_includes_cv_only_when_substantial() {
        let short = build_job_info_prompt("Job", Some("cv.pdf"));
        assert!(!short.contains("Candidate's CV/Resume"));

        let cv = "Experienced engineer with a decade of distributed systems work and a portfolio.";
        let long = build_job_info_prompt("Job", Some(cv));
        assert!(long.contains("Candidate's CV/Resume"));
        assert!(long.contains(cv));
    }

    #[test]
    fn test_prompt_embeds_job_post_and_json_instruction() {
        let prompt = build_job_info_prompt("Senior Engineer role", None);
        assert!(prompt.contains("Senior Engineer role"));
        assert!(prompt.contains(JSON_ONLY_INSTRUCTION));
        assert!(!prompt.contains("{job_post}"));
    }
}
