// Database models for Diesel
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// Insertable struct for new emails
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::emails)]
pub struct NewEmail {
    pub user_id: Uuid,
    pub gmail_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub sender_email: String,
    pub body_text: Option<String>,
    pub snippet: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Insertable struct for new tasks
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::tasks)]
pub struct NewTask {
    pub user_id: Uuid,
    pub email_id: Uuid,
    pub description: String,
    pub sender: String,
    pub priority: String,
    pub category: String,
}

/// Insertable struct for new users
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub email: String,
    pub name: String,
}
