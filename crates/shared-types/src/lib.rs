use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task priority. Stored as VARCHAR; unknown values clamp to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    /// Parse a priority string, clamping anything unrecognized to `Medium`.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("High") => Priority::High,
            Some("Low") => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Task category. Stored as VARCHAR; unknown values clamp to `General`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Follow-up")]
    FollowUp,
    #[serde(rename = "Meeting Prep")]
    MeetingPrep,
    Purchase,
    General,
    Review,
    Approval,
    Schedule,
    Research,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::FollowUp => "Follow-up",
            Category::MeetingPrep => "Meeting Prep",
            Category::Purchase => "Purchase",
            Category::General => "General",
            Category::Review => "Review",
            Category::Approval => "Approval",
            Category::Schedule => "Schedule",
            Category::Research => "Research",
        }
    }

    /// Parse a category string, clamping anything unrecognized to `General`.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("Follow-up") => Category::FollowUp,
            Some("Meeting Prep") => Category::MeetingPrep,
            Some("Purchase") => Category::Purchase,
            Some("Review") => Category::Review,
            Some("Approval") => Category::Approval,
            Some("Schedule") => Category::Schedule,
            Some("Research") => Category::Research,
            _ => Category::General,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::General
    }
}

/// A validated task candidate produced by the AI extraction step,
/// not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCandidate {
    pub description: String,
    pub priority: Priority,
    pub category: Category,
}

/// Task struct matching database column order exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email_id: Uuid,
    pub description: String,
    pub sender: String,
    pub priority: String, // stored as VARCHAR: "High", "Medium", "Low"
    pub category: String, // stored as VARCHAR, one of the eight category names
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Email struct matching database column order exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct Email {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gmail_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub sender_email: String,
    pub body_text: Option<String>,
    pub snippet: Option<String>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// User struct matching database column order exactly.
///
/// Token columns hold ciphertext only; plaintext never reaches this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub gmail_connected: bool,
    pub gmail_access_token: Option<String>,
    pub gmail_refresh_token: Option<String>,
    pub gmail_token_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summary returned by an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub emails_processed: i64,
    pub tasks_created: i64,
}

// API request/response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectInitResponse {
    pub auth_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub gmail_connected: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            gmail_connected: user.gmail_connected,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_clamps_unknown_to_medium() {
        assert_eq!(Priority::parse_or_default(Some("High")), Priority::High);
        assert_eq!(Priority::parse_or_default(Some("Low")), Priority::Low);
        assert_eq!(Priority::parse_or_default(Some("Urgent")), Priority::Medium);
        assert_eq!(Priority::parse_or_default(None), Priority::Medium);
    }

    #[test]
    fn test_category_clamps_unknown_to_general() {
        assert_eq!(
            Category::parse_or_default(Some("Meeting Prep")),
            Category::MeetingPrep
        );
        assert_eq!(
            Category::parse_or_default(Some("Follow-up")),
            Category::FollowUp
        );
        assert_eq!(
            Category::parse_or_default(Some("Spam")),
            Category::General
        );
        assert_eq!(Category::parse_or_default(None), Category::General);
    }

    #[test]
    fn test_category_serde_uses_display_names() {
        let json = serde_json::to_string(&Category::FollowUp).unwrap();
        assert_eq!(json, "\"Follow-up\"");

        let parsed: Category = serde_json::from_str("\"Meeting Prep\"").unwrap();
        assert_eq!(parsed, Category::MeetingPrep);
    }

    #[test]
    fn test_round_trip_strings_cover_all_categories() {
        let all = [
            Category::FollowUp,
            Category::MeetingPrep,
            Category::Purchase,
            Category::General,
            Category::Review,
            Category::Approval,
            Category::Schedule,
            Category::Research,
        ];
        for cat in all {
            assert_eq!(Category::parse_or_default(Some(cat.as_str())), cat);
        }
    }
}
