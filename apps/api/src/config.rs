use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Application configuration loaded from environment variables.
/// Every variable has a default; only malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Prefix the API routes are mounted under ("" for the domain root, or e.g. "/jobmail").
    pub base_path: String,
    /// Pending shares live in Redis when set, in process memory otherwise.
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    /// Server-side fallback key; clients normally send their own.
    pub groq_api_key: Option<String>,
    pub llm_api_url: String,
    pub default_model: String,
    pub max_attachment_bytes: usize,
    pub max_submission_bytes: usize,
    pub pending_share_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            base_path: normalize_base_path(&std::env::var("BASE_PATH").unwrap_or_default()),
            redis_url: optional_env("REDIS_URL"),
            redis_key_prefix: std::env::var("REDIS_KEY_PREFIX")
                .unwrap_or_else(|_| "jobmail:share".to_string()),
            groq_api_key: optional_env("GROQ_API_KEY"),
            llm_api_url: std::env::var("LLM_API_URL")
                .unwrap_or_else(|_| DEFAULT_LLM_API_URL.to_string()),
            default_model: std::env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_attachment_bytes: parse_nonzero_env("MAX_ATTACHMENT_BYTES", 10 * 1024 * 1024)?,
            max_submission_bytes: parse_nonzero_env("MAX_SUBMISSION_BYTES", 64 * 1024 * 1024)?,
            pending_share_ttl: Duration::from_secs(parse_nonzero_env(
                "PENDING_SHARE_TTL_SECS",
                3600,
            )?),
            sweep_interval: Duration::from_secs(parse_nonzero_env("SWEEP_INTERVAL_SECS", 300)?),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            rust_log: "info".to_string(),
            base_path: String::new(),
            redis_url: None,
            redis_key_prefix: "jobmail:share".to_string(),
            groq_api_key: None,
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            max_attachment_bytes: 10 * 1024 * 1024,
            max_submission_bytes: 64 * 1024 * 1024,
            pending_share_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

/// Sizes and intervals where zero would disable the feature or panic the sweeper.
fn parse_nonzero_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = parse_env(key, default)?;
    if value == T::default() {
        bail!("Environment variable '{key}' must be greater than zero");
    }
    Ok(value)
}

/// "" and "/" mean the domain root; anything else gets a leading slash and no trailing one.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
