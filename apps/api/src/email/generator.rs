//! Email generator — writes the application email from the job post, extracted job info
//! and optional CV text. Model output is parsed leniently: strict JSON first, then the
//! two string fields pulled out by hand, then a `Subject:` line scan.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::email::job_info::{JobInfo, MIN_CV_CONTEXT_CHARS};
use crate::email::prompts::{EMAIL_CV_CONTEXT, EMAIL_CV_NOTE, EMAIL_PROMPT_TEMPLATE};
use crate::errors::AppError;
use crate::llm_client::prompts::{fill, JSON_ONLY_INSTRUCTION};
use crate::llm_client::{extract_json_object, LlmClient};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

pub struct EmailContext<'a> {
    pub job_post: &'a str,
    pub additional_info: Option<&'a str>,
    pub cv_text: Option<&'a str>,
    pub job_info: &'a JobInfo,
}

pub fn build_email_prompt(ctx: &EmailContext<'_>) -> String {
    let portfolio = ctx.job_info.portfolio_url();

    let cv_context = match ctx.cv_text.map(str::trim).filter(|cv| !cv.is_empty()) {
        Some(cv) if cv.chars().count() > MIN_CV_CONTEXT_CHARS => {
            let portfolio_line = portfolio
                .map(|url| format!("Candidate's Portfolio: {url}\n\n"))
                .unwrap_or_default();
            let samples_instruction = if portfolio.is_some() {
                "ALWAYS include a reference to the portfolio website where they can see detailed projects and work samples"
            } else {
                "mention that detailed work samples are available upon request"
            };
            fill(
                EMAIL_CV_CONTEXT,
                &[
                    ("cv_text", cv),
                    ("portfolio_line", &portfolio_line),
                    ("samples_instruction", samples_instruction),
                ],
            )
        }
        Some(cv) => {
            let portfolio_note = portfolio
                .map(|url| format!("Portfolio: {url}. Reference the portfolio. "))
                .unwrap_or_default();
            fill(
                EMAIL_CV_NOTE,
                &[("cv_text", cv), ("portfolio_note", &portfolio_note)],
            )
        }
        None => String::new(),
    };

    let additional_info = ctx
        .additional_info
        .map(str::trim)
        .filter(|info| !info.is_empty())
        .map(|info| format!("Additional Information:\n{info}\n"))
        .unwrap_or_default();

    let portfolio_instruction = match portfolio {
        Some(url) => format!("direct them to the portfolio website ({url})"),
        None => "mention that work samples and project details are available upon request"
            .to_string(),
    };
    let attachment_reference = if portfolio.is_some() {
        "both the CV attachment and portfolio website"
    } else {
        "the CV attachment"
    };

    fill(
        EMAIL_PROMPT_TEMPLATE,
        &[
            ("job_post", ctx.job_post),
            ("additional_info", &additional_info),
            ("job_title", &ctx.job_info.job_title),
            ("company", &ctx.job_info.company),
            ("location", &ctx.job_info.location),
            ("cv_context", &cv_context),
            ("portfolio_instruction", &portfolio_instruction),
            ("attachment_reference", attachment_reference),
            ("json_only", JSON_ONLY_INSTRUCTION),
        ],
    )
}

/// Reads the JSON string value of `key` from text that may not be valid JSON
/// overall (raw newlines inside strings are the usual culprit).
fn extract_string_field(text: &str, key: &str) -> Option<String> {
    let key_pos = text.find(&format!("\"{key}\""))?;
    let after_key = text[key_pos + key.len() + 2..].trim_start();
    let after_colon = after_key.strip_prefix(':')?.trim_start();
    let mut chars = after_colon.strip_prefix('"')?.chars();

    let mut value = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(value),
            '\\' => match chars.next()? {
                'n' => value.push('\n'),
                'r' => value.push('\r'),
                't' => value.push('\t'),
                other => value.push(other),
            },
            c => value.push(c),
        }
    }
    None
}

pub fn parse_email_response(raw: &str, job_info: &JobInfo) -> EmailDraft {
    let candidate = extract_json_object(raw);

    match serde_json::from_str::<EmailDraft>(candidate) {
        Ok(draft) if !draft.subject.trim().is_empty() && !draft.body.trim().is_empty() => {
            return draft;
        }
        Ok(_) => debug!("Email JSON had empty fields; trying lenient extraction"),
        Err(e) => debug!(error = %e, "Direct email JSON parse failed; trying lenient extraction"),
    }

    if let (Some(subject), Some(body)) = (
        extract_string_field(candidate, "subject"),
        extract_string_field(candidate, "body"),
    ) {
        return EmailDraft { subject, body };
    }

    warn!("Email response had no usable JSON; falling back to raw text");
    let subject = raw
        .lines()
        .find(|line| line.to_lowercase().contains("subject") && line.contains(':'))
        .and_then(|line| line.split_once(':'))
        .map(|(_, rest)| rest.trim().replace(['"', '\''], ""))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("Application for {} Position", job_info.job_title));

    EmailDraft {
        subject,
        body: raw.to_string(),
    }
}

pub async fn generate_email(
    llm: &LlmClient,
    model: &str,
    ctx: &EmailContext<'_>,
) -> Result<EmailDraft, AppError> {
    let prompt = build_email_prompt(ctx);
    let raw = llm
        .complete(model, &prompt)
        .await
        .map_err(|e| AppError::Llm(format!("Email generation failed: {e}")))?;
    Ok(parse_email_response(&raw, ctx.job_info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_info(portfolio: &str) -> JobInfo {
        JobInfo {
            job_title: "Platform Engineer".into(),
            company: "Ferrous Labs".into(),
            portfolio_url: portfolio.into(),
            ..JobInfo::default()
        }
    }

    const LONG_CV: &str = "Ten years building distributed systems in Rust and Go, led platform teams.";

    #[test]
    fn test_parse_valid_json() {
        let raw = r#"{"subject": "Application: Platform Engineer", "body": "Dear team,\n\nHello."}"#;
        let draft = parse_email_response(raw, &JobInfo::default());
        assert_eq!(draft.subject, "Application: Platform Engineer");
        assert_eq!(draft.body, "Dear team,\n\nHello.");
    }

    #[test]
    fn test_parse_json_with_raw_newlines_uses_lenient_extraction() {
        let raw = "```json\n{\"subject\": \"Hi \\\"there\\\"\", \"body\": \"Line one\nLine two\\tend\"}\n```";
        let draft = parse_email_response(raw, &JobInfo::default());
        assert_eq!(draft.subject, "Hi \"there\"");
        assert_eq!(draft.body, "Line one\nLine two\tend");
    }

    #[test]
    fn test_parse_plain_text_finds_subject_line() {
        let raw = "Subject: Excited to join Ferrous Labs\n\nDear hiring manager, ...";
        let draft = parse_email_response(raw, &job_info("Not specified"));
        assert_eq!(draft.subject, "Excited to join Ferrous Labs");
        assert_eq!(draft.body, raw);
    }

    #[test]
    fn test_parse_plain_text_without_subject_uses_title() {
        let draft = parse_email_response("Dear hiring manager", &job_info("Not specified"));
        assert_eq!(draft.subject, "Application for Platform Engineer Position");
    }

    #[test]
    fn test_prompt_with_portfolio_and_cv() {
        let info = job_info("https://me.dev");
        let prompt = build_email_prompt(&EmailContext {
            job_post: "We need a platform engineer",
            additional_info: Some("Available from March"),
            cv_text: Some(LONG_CV),
            job_info: &info,
        });
        assert!(prompt.contains("Candidate's Portfolio: https://me.dev"));
        assert!(prompt.contains("direct them to the portfolio website (https://me.dev)"));
        assert!(prompt.contains("Additional Information:\nAvailable from March"));
        assert!(prompt.contains("both the CV attachment and portfolio website"));
        assert!(!prompt.contains("{cv_context}"));
    }

    #[test]
    fn test_prompt_without_portfolio_mentions_samples_on_request() {
        let info = job_info("Not specified");
        let prompt = build_email_prompt(&EmailContext {
            job_post: "Job",
            additional_info: None,
            cv_text: Some("cv.pdf"),
            job_info: &info,
        });
        assert!(prompt.contains("Note: CV file uploaded (cv.pdf)"));
        assert!(prompt.contains("available upon request"));
        assert!(!prompt.contains("Additional Information"));
    }

    #[test]
    fn test_extract_string_field_missing_key() {
        assert_eq!(extract_string_field(r#"{"body": "x"}"#, "subject"), None);
        assert_eq!(extract_string_field(r#"{"subject": "unterminated"#, "subject"), None);
    }
}
