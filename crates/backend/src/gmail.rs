//! Gmail API client: fetches recent inbox messages and normalizes them into
//! provider-independent envelopes.

use chrono::{DateTime, Duration, Utc};
use google_gmail1::api::{Message, MessagePart};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::IngestError;

/// Normalized representation of a fetched mail message, independent of the
/// Gmail wire format.
#[derive(Debug, Clone)]
pub struct MailEnvelope {
    pub gmail_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    pub body: String,
    pub snippet: String,
    pub received_at: DateTime<Utc>,
}

/// Client for interacting with the Gmail API on behalf of one user.
///
/// The access token is resolved by the vault before construction; this client
/// never refreshes credentials itself.
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
    timeout: std::time::Duration,
}

impl GmailClient {
    /// Create a Gmail client from an already-valid plaintext access token.
    pub async fn new(access_token: &str, timeout: std::time::Duration) -> Result<Self, IngestError> {
        let auth = google_gmail1::yup_oauth2::AccessTokenAuthenticator::builder(
            access_token.to_string(),
        )
        .build()
        .await
        .map_err(|e| IngestError::Provider(format!("Failed to build authenticator: {}", e)))?;

        let connector = google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| IngestError::Provider(format!("Failed to load TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = Gmail::new(client, auth);

        Ok(Self { hub, timeout })
    }

    /// Fetch inbox messages received within the last `window_days` days,
    /// normalized into envelopes.
    ///
    /// Individual messages that fail to fetch or parse are logged and
    /// skipped; a failure of the listing call aborts with a provider error.
    pub async fn fetch_unprocessed(
        &self,
        window_days: i64,
        max_results: u32,
    ) -> Result<Vec<MailEnvelope>, IngestError> {
        let cutoff = Utc::now() - Duration::days(window_days);
        let query = format!("in:inbox after:{}", cutoff.format("%Y/%m/%d"));

        let list_call = self
            .hub
            .users()
            .messages_list("me")
            .q(&query)
            .max_results(max_results)
            .doit();

        let (_, list_response) = tokio::time::timeout(self.timeout, list_call)
            .await
            .map_err(|_| IngestError::Provider("Gmail message listing timed out".to_string()))?
            .map_err(|e| IngestError::Provider(format!("Failed to list messages: {}", e)))?;

        let messages = list_response.messages.unwrap_or_default();
        let mut envelopes = Vec::new();

        for msg in messages {
            let Some(id) = msg.id else { continue };
            match self.get_message(&id).await {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => {
                    tracing::warn!("Failed to fetch message {}: {}", id, e);
                }
            }
        }

        Ok(envelopes)
    }

    /// Get full message details and normalize them.
    async fn get_message(&self, message_id: &str) -> Result<MailEnvelope, IngestError> {
        let call = self
            .hub
            .users()
            .messages_get("me", message_id)
            .format("full")
            .doit();

        let (_, message) = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| IngestError::Provider("Gmail message fetch timed out".to_string()))?
            .map_err(|e| IngestError::Provider(format!("Failed to get message: {}", e)))?;

        Ok(parse_message(message))
    }
}

fn parse_message(message: Message) -> MailEnvelope {
    let gmail_id = message.id.clone().unwrap_or_default();
    let thread_id = message.thread_id.clone();
    let snippet = message.snippet.clone().unwrap_or_default();

    let mut subject = String::new();
    let mut from = String::new();
    let mut received_at = None;

    if let Some(payload) = &message.payload {
        if let Some(headers) = &payload.headers {
            for header in headers {
                match header.name.as_deref() {
                    Some("Subject") => subject = header.value.clone().unwrap_or_default(),
                    Some("From") => from = header.value.clone().unwrap_or_default(),
                    Some("Date") => {
                        if let Some(date_str) = &header.value {
                            received_at = parse_date(date_str);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    if subject.is_empty() {
        subject = "No Subject".to_string();
    }
    if from.is_empty() {
        from = "Unknown Sender".to_string();
    }

    let (sender_name, sender_email) = parse_sender(&from);
    let body = message
        .payload
        .as_ref()
        .map(extract_body)
        .unwrap_or_default();

    MailEnvelope {
        gmail_id,
        thread_id,
        subject,
        sender_name,
        sender_email,
        body,
        snippet,
        received_at: received_at.unwrap_or_else(Utc::now),
    }
}

/// Parse a "From" header like `Jane Doe <jane@example.com>` into
/// (name, address). Without the angle-bracket form, the whole string is used
/// as both.
fn parse_sender(from: &str) -> (String, String) {
    let from = from.trim();

    if let (Some(start), Some(end)) = (from.rfind('<'), from.rfind('>')) {
        if start < end {
            let address = from[start + 1..end].trim().to_string();
            let name = from[..start].trim().trim_matches('"').trim();
            let name = if name.is_empty() {
                address.clone()
            } else {
                name.to_string()
            };
            return (name, address);
        }
    }

    (from.to_string(), from.to_string())
}

fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extract the best-effort text body from a message payload: prefer the
/// plain-text part, fall back to tag-stripped HTML, else empty.
fn extract_body(payload: &MessagePart) -> String {
    let mut text_body = None;
    let mut html_body = None;

    collect_bodies(payload, &mut text_body, &mut html_body);

    if let Some(text) = text_body {
        return text;
    }
    if let Some(html) = html_body {
        return strip_html(&html);
    }
    String::new()
}

fn collect_bodies(part: &MessagePart, text_body: &mut Option<String>, html_body: &mut Option<String>) {
    let decoded = part
        .body
        .as_ref()
        .and_then(|b| b.data.as_ref())
        .and_then(|data| String::from_utf8(data.clone()).ok());

    match part.mime_type.as_deref() {
        Some("text/plain") if text_body.is_none() => *text_body = decoded,
        Some("text/html") if html_body.is_none() => *html_body = decoded,
        _ => {}
    }

    if let Some(parts) = &part.parts {
        for nested in parts {
            if text_body.is_some() && html_body.is_some() {
                break;
            }
            collect_bodies(nested, text_body, html_body);
        }
    }
}

/// Best-effort HTML-to-text: drop markup tags, keep the text content.
fn strip_html(html: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));
    re.replace_all(html, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePartBody, MessagePartHeader};

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    fn text_part(mime: &str, content: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(MessagePartBody {
                data: Some(content.as_bytes().to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_sender_with_display_name() {
        let (name, email) = parse_sender("Jane Doe <jane@co.com>");
        assert_eq!(name, "Jane Doe");
        assert_eq!(email, "jane@co.com");
    }

    #[test]
    fn test_parse_sender_quoted_name() {
        let (name, email) = parse_sender("\"Doe, Jane\" <jane@co.com>");
        assert_eq!(name, "Doe, Jane");
        assert_eq!(email, "jane@co.com");
    }

    #[test]
    fn test_parse_sender_bare_address_used_for_both() {
        let (name, email) = parse_sender("jane@co.com");
        assert_eq!(name, "jane@co.com");
        assert_eq!(email, "jane@co.com");
    }

    #[test]
    fn test_parse_sender_empty_name_falls_back_to_address() {
        let (name, email) = parse_sender("<jane@co.com>");
        assert_eq!(name, "jane@co.com");
        assert_eq!(email, "jane@co.com");
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let parsed = parse_date("Tue, 1 Jul 2025 10:52:37 +0200").unwrap();
        assert_eq!(parsed.timestamp(), 1751359957);
    }

    #[test]
    fn test_parse_date_garbage_is_none() {
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn test_strip_html_removes_tags() {
        assert_eq!(
            strip_html("<p>Hello <b>world</b></p>"),
            "Hello world"
        );
    }

    #[test]
    fn test_extract_body_prefers_plain_text() {
        let payload = MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            parts: Some(vec![
                text_part("text/html", "<p>html version</p>"),
                text_part("text/plain", "plain version"),
            ]),
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "plain version");
    }

    #[test]
    fn test_extract_body_falls_back_to_stripped_html() {
        let payload = MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            parts: Some(vec![text_part("text/html", "<p>only html</p>")]),
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "only html");
    }

    #[test]
    fn test_extract_body_missing_parts_yields_empty() {
        let payload = MessagePart::default();
        assert_eq!(extract_body(&payload), "");
    }

    #[test]
    fn test_parse_message_normalizes_headers() {
        let message = Message {
            id: Some("msg-123".to_string()),
            thread_id: Some("thread-9".to_string()),
            snippet: Some("Please send the...".to_string()),
            payload: Some(MessagePart {
                headers: Some(vec![
                    header("Subject", "Please send the Q3 report by Friday"),
                    header("From", "Jane Doe <jane@co.com>"),
                    header("Date", "Tue, 1 Jul 2025 10:52:37 +0200"),
                ]),
                ..text_part("text/plain", "The report is due Friday.")
            }),
            ..Default::default()
        };

        let envelope = parse_message(message);
        assert_eq!(envelope.gmail_id, "msg-123");
        assert_eq!(envelope.thread_id.as_deref(), Some("thread-9"));
        assert_eq!(envelope.subject, "Please send the Q3 report by Friday");
        assert_eq!(envelope.sender_name, "Jane Doe");
        assert_eq!(envelope.sender_email, "jane@co.com");
        assert_eq!(envelope.body, "The report is due Friday.");
    }

    #[test]
    fn test_parse_message_missing_headers_get_defaults() {
        let envelope = parse_message(Message::default());
        assert_eq!(envelope.subject, "No Subject");
        assert_eq!(envelope.sender_name, "Unknown Sender");
        assert_eq!(envelope.body, "");
    }
}
