/// LLM Client — the single point of entry for all completion-service calls.
///
/// ARCHITECTURAL RULE: No other module may call the completion API directly.
/// All LLM interactions MUST go through this module.
///
/// Speaks the OpenAI-compatible chat-completions protocol (Groq by default). The API
/// key normally belongs to the end user and is attached per request.
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

/// Vision-capable model used for screenshot transcription regardless of the
/// user's text model.
pub const VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
const TEXT_TEMPERATURE: f32 = 0.7;
const TEXT_MAX_TOKENS: u32 = 2000;
const VISION_TEMPERATURE: f32 = 0.3;
const VISION_MAX_TOKENS: u32 = 2048;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("No API key configured")]
    MissingApiKey,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    /// Text of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Wraps the chat-completions API with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(api_url: String, api_key: Option<String>) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            api_url,
            api_key,
        })
    }

    /// Same client, different credentials. The HTTP connection pool is shared.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            api_url: self.api_url.clone(),
            api_key: Some(api_key.into()),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Makes a raw chat-completions call, returning the full response object.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    async fn call(&self, request_body: &ChatRequest<'_>) -> Result<LlmResponse, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.api_url)
                .bearer_auth(api_key)
                .json(request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: api_error_message(&body),
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            if let Some(usage) = &llm_response.usage {
                debug!(
                    model = request_body.model,
                    "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                    usage.prompt_tokens,
                    usage.completion_tokens
                );
            }

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Single-turn text completion.
    pub async fn complete(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let request = text_request(model, prompt);
        let response = self.call(&request).await?;
        response
            .text()
            .map(String::from)
            .ok_or(LlmError::EmptyContent)
    }

    /// Transcribes an image given as a data URL, using [`VISION_MODEL`].
    pub async fn complete_vision(
        &self,
        prompt: &str,
        image_data_url: &str,
    ) -> Result<String, LlmError> {
        let request = vision_request(prompt, image_data_url);
        let response = self.call(&request).await?;
        response
            .text()
            .map(String::from)
            .ok_or(LlmError::EmptyContent)
    }

    /// Calls the LLM and deserializes the first JSON object in its answer.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<T, LlmError> {
        let text = self.complete(model, prompt).await?;
        serde_json::from_str(extract_json_object(&text)).map_err(LlmError::Parse)
    }
}

fn text_request<'a>(model: &'a str, prompt: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: MessageContent::Text(prompt),
        }],
        temperature: TEXT_TEMPERATURE,
        max_tokens: TEXT_MAX_TOKENS,
    }
}

fn vision_request<'a>(prompt: &'a str, image_data_url: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model: VISION_MODEL,
        messages: vec![ChatMessage {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: prompt },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_url,
                    },
                },
            ]),
        }],
        temperature: VISION_TEMPERATURE,
        max_tokens: VISION_MAX_TOKENS,
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// The outermost `{ ... }` span of the answer, after fence stripping. Models often
/// wrap the object in prose.
pub fn extract_json_object(text: &str) -> &str {
    let text = strip_json_fences(text);
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_json_object_from_prose() {
        let input = "Sure! Here it is:\n{\"subject\": \"Hi\"}\nHope that helps.";
        assert_eq!(extract_json_object(input), "{\"subject\": \"Hi\"}");
    }

    #[test]
    fn test_extract_json_object_without_braces_returns_input() {
        assert_eq!(extract_json_object("no json here"), "no json here");
    }

    #[test]
    fn test_vision_request_shape() {
        let request = vision_request("Extract the text", "data:image/png;base64,AAAA");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], VISION_MODEL);
        let content = &value["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_text_request_content_is_plain_string() {
        let request = text_request("llama-3.3-70b-versatile", "hello");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["content"], "hello");
        assert_eq!(value["max_tokens"], TEXT_MAX_TOKENS);
    }

    #[test]
    fn test_api_error_message_prefers_structured_body() {
        let body = r#"{"error": {"message": "Invalid API Key"}}"#;
        assert_eq!(api_error_message(body), "Invalid API Key");
        assert_eq!(api_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let client = LlmClient::new("http://127.0.0.1:9/unused".into(), None).unwrap();
        assert!(!client.has_api_key());
        let err = client.complete("model", "prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
        assert!(client.with_api_key("gsk_test").has_api_key());
    }

    #[test]
    fn test_response_text_reads_first_choice() {
        let json = r#"{"choices":[{"message":{"content":"hello"}}],"usage":null}"#;
        let response: LlmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), Some("hello"));
    }
}
