//! Runtime configuration loaded from environment variables.

use anyhow::{Context, Result};
use std::env;

/// Configuration consumed by the ingestion pipeline and HTTP surface.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Maximum messages fetched and processed per ingestion run.
    pub max_emails_per_run: u32,
    /// Only messages received within this many days are considered.
    pub ingest_window_days: i64,
    /// Character budget for the email body inside the AI prompt.
    pub prompt_char_budget: usize,
    /// Rate gate: admissions allowed per window per user.
    pub rate_limit_count: usize,
    /// Rate gate: window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Timeout applied to every external call (mail fetch, AI, token refresh).
    pub external_timeout_secs: u64,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub oauth_redirect_uri: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub secret_key: String,
    pub encryption_salt: String,
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Only the Google OAuth client settings and the OpenAI key are required;
    /// everything else has a development default.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env_parsed("PORT", 3000),
            max_emails_per_run: env_parsed("MAX_EMAILS_PER_PROCESS", 50),
            ingest_window_days: env_parsed("INGEST_WINDOW_DAYS", 7),
            prompt_char_budget: env_parsed("AI_PROMPT_CHAR_BUDGET", 2000),
            rate_limit_count: env_parsed("RATE_LIMIT_COUNT", 5),
            rate_limit_window_secs: env_parsed("RATE_LIMIT_WINDOW_SECS", 300),
            external_timeout_secs: env_parsed("EXTERNAL_TIMEOUT_SECS", 30),
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID must be set")?,
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET must be set")?,
            oauth_redirect_uri: env::var("OAUTH_REDIRECT_URI").unwrap_or_else(|_| {
                "http://localhost:3000/api/oauth/callback".to_string()
            }),
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string()),
            secret_key: env::var("SECRET_KEY").unwrap_or_else(|_| "dev-secret-key".to_string()),
            encryption_salt: env::var("ENCRYPTION_SALT")
                .unwrap_or_else(|_| "email-task-manager-salt".to_string()),
        })
    }
}
