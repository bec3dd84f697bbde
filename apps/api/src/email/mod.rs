// Application-email drafting: the downstream consumer of shared job posts.
// Implements: screenshot transcription, job-info extraction, email generation.
// All LLM calls go through llm_client — no direct HTTP calls to the completion API here.

pub mod generator;
pub mod handlers;
pub mod job_info;
pub mod prompts;
