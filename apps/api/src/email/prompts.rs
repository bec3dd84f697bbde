// All LLM prompt constants for the email module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// Screenshot transcription prompt, sent with the image to the vision model.
pub const IMAGE_TRANSCRIBE_PROMPT: &str = "Extract all the text from this job post image. \
    Provide the complete job description including job title, company name, location, \
    requirements, responsibilities, and any other relevant information. \
    Format it clearly and keep the original structure.";

/// Job-info extraction prompt. Replace `{job_post}`, `{cv_context}` and `{json_only}`.
pub const JOB_INFO_PROMPT_TEMPLATE: &str = r#"Extract the following information from this job post and return ONLY a valid JSON object with these exact keys:

Job Post:
{job_post}
{cv_context}

Return a JSON object with these fields (use "Not specified" if information is not available):
{
    "jobTitle": "extracted job title",
    "company": "company name",
    "location": "job location",
    "jobType": "full-time/part-time/contract/etc",
    "experience": "required experience level",
    "skills": "key skills required (comma-separated)",
    "recruiterEmail": "recruiter or contact email if provided in the post",
    "portfolioUrl": "candidate's portfolio URL from CV (if provided)"
}

IMPORTANT:
- Look for email addresses in the job post for recruiterEmail
- Look for portfolio/website URLs in the CV for portfolioUrl

{json_only}"#;

/// CV block appended to the job-info prompt. Replace `{cv_text}`.
pub const JOB_INFO_CV_CONTEXT: &str = "\n\nCandidate's CV/Resume:\n{cv_text}\n\n\
    IMPORTANT: Also extract the candidate's portfolio URL from the CV if available \
    (look for portfolio, website, or personal project links).";

/// Email generation prompt. Replace `{job_post}`, `{additional_info}`, `{job_title}`,
/// `{company}`, `{location}`, `{cv_context}`, `{portfolio_instruction}`,
/// `{attachment_reference}` and `{json_only}`.
pub const EMAIL_PROMPT_TEMPLATE: &str = r#"You are a professional job application email writer. Based on the following job post and information, write a compelling and professional job application email.

Job Post:
{job_post}

{additional_info}
Extracted Job Information:
- Job Title: {job_title}
- Company: {company}
- Location: {location}
{cv_context}

Instructions:
1. Write a professional subject line
2. Write a compelling email body that:
   - Addresses the hiring manager professionally
   - Expresses genuine interest in the position
   - Briefly highlights relevant skills and experience (2-3 key points max)
   - Shows enthusiasm for the company/role
   - IMPORTANT: Instead of listing projects, {portfolio_instruction}
   - Includes a strong call to action
   - Maintains a professional yet personable tone
   - Is concise (3 short paragraphs maximum)
   - References {attachment_reference}

Format your response as JSON:
{
    "subject": "subject line here",
    "body": "email body here with proper line breaks"
}

{json_only}"#;

/// CV block for the email prompt when a real CV text is available. Replace
/// `{cv_text}`, `{portfolio_line}` and `{samples_instruction}`.
pub const EMAIL_CV_CONTEXT: &str = "\n\nCandidate's CV/Resume Content:\n{cv_text}\n\n\
    {portfolio_line}IMPORTANT: Use the information from the CV to understand the candidate's \
    background, but DON'T list or describe individual projects in detail. Instead, briefly \
    mention relevant skills and experience (2-3 key points max), then {samples_instruction}. \
    Keep the email concise and professional.";

/// CV block when the CV text is too short to be useful. Replace `{cv_text}` and
/// `{portfolio_note}`.
pub const EMAIL_CV_NOTE: &str = "\n\nNote: CV file uploaded ({cv_text}). {portfolio_note}\
    Write a general professional email expressing interest and qualifications.";
