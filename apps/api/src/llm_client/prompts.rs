// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Closing instruction for prompts whose answer is parsed as JSON.
pub const JSON_ONLY_INSTRUCTION: &str = "Return ONLY the JSON object, no additional text.";

/// Placeholder the model is told to use for fields it cannot find.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Fills `{name}` placeholders in a prompt template.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{name}}}"), value)
        })
}
