//! AI task extraction from normalized email content.
//!
//! One stateless call per message: build a bounded prompt, ask the completion
//! endpoint for a JSON array of tasks, parse defensively. Extraction failure
//! for one message yields an empty candidate list — it never aborts the
//! ingestion of other messages.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use shared_types::TaskCandidate;

use crate::config::AppConfig;
use crate::sanitize::{truncate_chars, validate_task_candidate};

const SYSTEM_PROMPT: &str = "You are an AI assistant that extracts actionable tasks from emails. \
     You analyze email content and identify specific, actionable items that \
     require follow-up or action.";

/// Configuration for the task extractor.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    /// Character budget for the email body inside the prompt.
    pub prompt_char_budget: usize,
}

/// Extracts task candidates from an email via an OpenAI-compatible
/// chat-completions endpoint.
pub struct TaskExtractor {
    client: Client,
    config: ExtractorConfig,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl TaskExtractor {
    pub fn new(config: ExtractorConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    pub fn from_config(app: &AppConfig) -> anyhow::Result<Self> {
        Self::new(ExtractorConfig {
            base_url: app.openai_base_url.clone(),
            api_key: app.openai_api_key.clone(),
            model: app.openai_model.clone(),
            timeout: Duration::from_secs(app.external_timeout_secs),
            prompt_char_budget: app.prompt_char_budget,
        })
    }

    /// Extract validated task candidates from one email.
    ///
    /// Transport, timeout, and parse failures are logged and yield an empty
    /// list; the failure is observable through the return value.
    pub async fn extract(&self, subject: &str, body: &str, sender: &str) -> Vec<TaskCandidate> {
        let prompt = self.build_prompt(subject, body, sender);

        let content = match self.complete(&prompt).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Task extraction call failed: {:#}", e);
                return Vec::new();
            }
        };

        parse_response(&content)
    }

    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 1000,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion request failed: {} - {}", status, body);
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))
    }

    fn build_prompt(&self, subject: &str, body: &str, sender: &str) -> String {
        let body = truncate_chars(body, self.config.prompt_char_budget);

        format!(
            "Please analyze the following email and extract any actionable tasks. For each task, provide:\n\
             1. A clear, concise description of what needs to be done\n\
             2. Priority level (High, Medium, Low) based on urgency indicators and sender importance\n\
             3. Category (Follow-up, Meeting Prep, Purchase, General, Review, Approval, Schedule, Research)\n\
             \n\
             Email Details:\n\
             - Subject: {subject}\n\
             - Sender: {sender}\n\
             - Body: {body}\n\
             \n\
             Guidelines for task extraction:\n\
             - Only extract tasks that are clearly actionable\n\
             - Consider urgency words like \"urgent\", \"asap\", \"deadline\", \"important\"\n\
             - Consider sender importance (managers, team leads, etc.)\n\
             - Look for specific requests, follow-ups, approvals, or action items\n\
             - Ignore general information or announcements without clear actions\n\
             \n\
             Return the response as a JSON array of objects with the following structure:\n\
             [\n\
                 {{\n\
                     \"description\": \"Clear description of the task\",\n\
                     \"priority\": \"High|Medium|Low\",\n\
                     \"category\": \"Follow-up|Meeting Prep|Purchase|General|Review|Approval|Schedule|Research\"\n\
                 }}\n\
             ]\n\
             \n\
             If no actionable tasks are found, return an empty array []."
        )
    }
}

/// Parse a model response into validated task candidates.
///
/// Markdown code fences are stripped as an explicit normalization step; a
/// response that still fails to parse as a JSON array returns an empty list.
pub fn parse_response(response_text: &str) -> Vec<TaskCandidate> {
    let cleaned = strip_code_fences(response_text);

    let parsed: Vec<Value> = match serde_json::from_str(cleaned) {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!("Failed to parse AI response as JSON array: {}", e);
            return Vec::new();
        }
    };

    parsed
        .iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let description = obj.get("description")?.as_str()?;
            validate_task_candidate(
                description,
                obj.get("priority").and_then(Value::as_str),
                obj.get("category").and_then(Value::as_str),
            )
        })
        .collect()
}

fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Category, Priority};

    #[test]
    fn test_parse_plain_json_array() {
        let tasks = parse_response(
            r#"[{"description": "Review budget", "priority": "High", "category": "Review"}]"#,
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "Review budget");
        assert_eq!(tasks[0].priority, Priority::High);
        assert_eq!(tasks[0].category, Category::Review);
    }

    #[test]
    fn test_parse_strips_markdown_fences() {
        let tasks = parse_response(
            "```json\n[{\"description\": \"Book the room\", \"priority\": \"Low\", \"category\": \"Schedule\"}]\n```",
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].category, Category::Schedule);
    }

    #[test]
    fn test_parse_garbage_returns_empty() {
        assert!(parse_response("the model rambled instead of emitting JSON").is_empty());
        assert!(parse_response("").is_empty());
        assert!(parse_response("{\"not\": \"an array\"}").is_empty());
    }

    #[test]
    fn test_parse_clamps_invalid_enums() {
        let tasks = parse_response(
            r#"[{"description": "Do the thing", "priority": "Urgent", "category": "Misc"}]"#,
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].priority, Priority::Medium);
        assert_eq!(tasks[0].category, Category::General);
    }

    #[test]
    fn test_parse_drops_descriptionless_entries() {
        let tasks = parse_response(
            r#"[{"priority": "High"}, "not an object", {"description": "  "}, {"description": "Keep me"}]"#,
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "Keep me");
    }

    #[test]
    fn test_parse_omitted_fields_default() {
        // Scenario: "Please send the Q3 report by Friday" with no priority
        // or category emitted by the model
        let tasks =
            parse_response(r#"[{"description": "Send the Q3 report to Jane by Friday"}]"#);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].description.contains("Q3 report"));
        assert_eq!(tasks[0].priority, Priority::Medium);
        assert_eq!(tasks[0].category, Category::General);
    }

    #[test]
    fn test_prompt_body_is_bounded() {
        let extractor = TaskExtractor::new(ExtractorConfig {
            base_url: "http://localhost".to_string(),
            api_key: "test".to_string(),
            model: "gpt-4".to_string(),
            timeout: Duration::from_secs(5),
            prompt_char_budget: 10,
        })
        .unwrap();

        let prompt = extractor.build_prompt("subject", &"x".repeat(5000), "sender");
        assert!(prompt.len() < 2000);
        assert!(prompt.contains("- Body: xxxxxxxxxx\n"));
    }
}
