//! Input sanitization and structural validation for email content and
//! AI-extracted task candidates.

use shared_types::{Category, Priority, TaskCandidate};
use thiserror::Error;

/// Maximum subject length in characters.
pub const MAX_SUBJECT_CHARS: usize = 500;
/// Maximum body length in characters (caps AI processing cost).
pub const MAX_BODY_CHARS: usize = 50_000;
/// Maximum task description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 1_000;

/// A single item failed structural constraints. The item is skipped;
/// the run continues.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Truncate a string to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// HTML-escape and length-cap a text input.
pub fn sanitize_text(text: &str, max_chars: Option<usize>) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.trim().chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }

    match max_chars {
        Some(max) if escaped.chars().count() > max => escaped.chars().take(max).collect(),
        _ => escaped,
    }
}

/// Sanitized subject and body of a message that passed the size bounds.
#[derive(Debug, Clone)]
pub struct ValidatedContent {
    pub subject: String,
    pub body: String,
}

/// Validate and sanitize email content before persistence.
pub fn validate_email_content(subject: &str, body: &str) -> Result<ValidatedContent, ValidationError> {
    let mut errors = Vec::new();

    if subject.trim().is_empty() {
        errors.push("Subject is required");
    } else if subject.chars().count() > MAX_SUBJECT_CHARS {
        errors.push("Subject too long (max 500 characters)");
    }

    if body.chars().count() > MAX_BODY_CHARS {
        errors.push("Email body too long (max 50KB)");
    }

    if !errors.is_empty() {
        return Err(ValidationError(errors.join("; ")));
    }

    Ok(ValidatedContent {
        subject: sanitize_text(subject, Some(MAX_SUBJECT_CHARS)),
        body: sanitize_text(body, Some(MAX_BODY_CHARS)),
    })
}

/// Validate a raw task candidate from the extractor.
///
/// Empty descriptions drop the candidate entirely; out-of-enum priority and
/// category clamp to their defaults; the description is HTML-escaped and
/// truncated to the cap.
pub fn validate_task_candidate(
    description: &str,
    priority: Option<&str>,
    category: Option<&str>,
) -> Option<TaskCandidate> {
    if description.trim().is_empty() {
        return None;
    }

    Some(TaskCandidate {
        description: sanitize_text(description, Some(MAX_DESCRIPTION_CHARS)),
        priority: Priority::parse_or_default(priority),
        category: Category::parse_or_default(category),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_sanitize_escapes_html() {
        assert_eq!(
            sanitize_text("<b>bold</b> & \"quoted\"", None),
            "&lt;b&gt;bold&lt;/b&gt; &amp; &quot;quoted&quot;"
        );
    }

    #[test]
    fn test_sanitize_truncates_to_cap() {
        let long = "a".repeat(5000);
        let capped = sanitize_text(&long, Some(MAX_DESCRIPTION_CHARS));
        assert_eq!(capped.chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_empty_subject_rejected() {
        assert!(validate_email_content("   ", "body").is_err());
    }

    #[test]
    fn test_oversized_subject_rejected() {
        let subject = "s".repeat(MAX_SUBJECT_CHARS + 1);
        assert!(validate_email_content(&subject, "body").is_err());
    }

    #[test]
    fn test_oversized_body_rejected() {
        let body = "b".repeat(MAX_BODY_CHARS + 1);
        assert!(validate_email_content("subject", &body).is_err());
    }

    #[test]
    fn test_valid_content_is_sanitized() {
        let content = validate_email_content("Hello <World>", "a & b").unwrap();
        assert_eq!(content.subject, "Hello &lt;World&gt;");
        assert_eq!(content.body, "a &amp; b");
    }

    #[test]
    fn test_candidate_empty_description_dropped() {
        assert!(validate_task_candidate("  ", Some("High"), None).is_none());
    }

    #[test]
    fn test_candidate_invalid_priority_clamps_to_medium() {
        let candidate = validate_task_candidate("Do thing", Some("Urgent"), None).unwrap();
        assert_eq!(candidate.priority, shared_types::Priority::Medium);
        assert_eq!(candidate.category, shared_types::Category::General);
    }

    #[test]
    fn test_candidate_long_description_truncated() {
        let description = "d".repeat(5000);
        let candidate = validate_task_candidate(&description, None, None).unwrap();
        assert_eq!(candidate.description.chars().count(), MAX_DESCRIPTION_CHARS);
    }
}
