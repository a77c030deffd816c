//! The ingestion pipeline: rate gate → credential resolution → mail fetch →
//! per-message extraction and atomic persistence.
//!
//! Run-level failures (rate limit, auth, provider) abort the run with a typed
//! error. Item-level failures (one invalid message, one failed commit) are
//! contained: the offending message is skipped and the run continues.

use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use shared_types::IngestReport;
use std::time::Duration;
use uuid::Uuid;

use crate::db;
use crate::error::IngestError;
use crate::gmail::{GmailClient, MailEnvelope};
use crate::models::{NewEmail, NewTask};
use crate::sanitize::{self, truncate_chars};
use crate::vault;
use crate::AppState;

/// Maximum stored length for sender fields.
const MAX_SENDER_CHARS: usize = 255;
/// Maximum stored length for the snippet.
const MAX_SNIPPET_CHARS: usize = 500;

/// Service orchestrating one ingestion run for one user.
pub struct IngestService;

impl IngestService {
    /// Run ingestion for a user: fetch unseen inbox messages, extract tasks,
    /// and persist each message with its tasks as one atomic unit.
    pub async fn run(state: &AppState, user_id: Uuid) -> Result<IngestReport, IngestError> {
        let config = &state.config;

        // Step 1: admission. Rejection has no side effects.
        let gate_key = format!("user_{}", user_id);
        let window = Duration::from_secs(config.rate_limit_window_secs);
        if !state.rate_gate.admit(&gate_key, config.rate_limit_count, window) {
            tracing::debug!("Ingestion rate limited for user {}", user_id);
            return Err(IngestError::RateLimited {
                limit: config.rate_limit_count,
                window_secs: config.rate_limit_window_secs,
            });
        }

        let mut conn = state
            .pool
            .get()
            .await
            .map_err(|e| IngestError::Internal(anyhow::anyhow!("Failed to get DB connection: {}", e)))?;

        let user = db::users::get_by_id(&mut conn, user_id)
            .await
            .map_err(IngestError::Internal)?;

        // Step 2: credential resolution, refreshing if expired.
        let resolved = vault::resolve_access_token(&state.http, &state.vault, &user, config).await?;

        if let Some(refreshed) = &resolved.refreshed {
            // Persisting the refreshed token is best-effort; a failure just
            // means the next run refreshes again.
            if let Err(e) = db::users::update_access_token(
                &mut conn,
                user_id,
                &refreshed.encrypted_access_token,
                refreshed.expires_at,
            )
            .await
            {
                tracing::warn!("Failed to persist refreshed token for {}: {:#}", user_id, e);
            }
        }

        // Step 3: bounded fetch. Provider failure aborts the run.
        let client = GmailClient::new(
            &resolved.access_token,
            Duration::from_secs(config.external_timeout_secs),
        )
        .await?;

        let envelopes = client
            .fetch_unprocessed(config.ingest_window_days, config.max_emails_per_run)
            .await?;

        tracing::info!(
            "Fetched {} candidate messages for user {}",
            envelopes.len(),
            user_id
        );

        // Step 4: per-message extraction and commit, in fetch order.
        let mut report = IngestReport::default();

        for envelope in envelopes {
            match Self::ingest_one(state, &mut conn, user_id, &envelope).await {
                Ok(Some(tasks_created)) => {
                    report.emails_processed += 1;
                    report.tasks_created += tasks_created as i64;
                }
                Ok(None) => {
                    tracing::trace!("Skipped message {}", envelope.gmail_id);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to commit message {}, continuing: {:#}",
                        envelope.gmail_id,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Ingestion for user {} done: {} emails, {} tasks",
            user_id,
            report.emails_processed,
            report.tasks_created
        );

        Ok(report)
    }

    /// Ingest a single message. Returns `Ok(None)` when the message was
    /// skipped (duplicate or invalid), `Ok(Some(n))` with the number of tasks
    /// created when the unit committed.
    async fn ingest_one(
        state: &AppState,
        conn: &mut diesel_async::AsyncPgConnection,
        user_id: Uuid,
        envelope: &MailEnvelope,
    ) -> anyhow::Result<Option<usize>> {
        // Cheap pre-check; the unique constraint is the authoritative guard.
        if db::emails::exists(conn, user_id, &envelope.gmail_id).await? {
            return Ok(None);
        }

        let content = match sanitize::validate_email_content(&envelope.subject, &envelope.body) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Skipping message {}: {}", envelope.gmail_id, e);
                return Ok(None);
            }
        };

        // Extraction runs outside the transaction; it is stateless and its
        // failure mode is an empty candidate list.
        let candidates = state
            .extractor
            .extract(&envelope.subject, &envelope.body, &envelope.sender_name)
            .await;

        let sender = truncate_chars(&envelope.sender_name, MAX_SENDER_CHARS).to_string();
        let new_email = NewEmail {
            user_id,
            gmail_id: envelope.gmail_id.clone(),
            thread_id: envelope.thread_id.clone(),
            subject: content.subject,
            sender: sender.clone(),
            sender_email: truncate_chars(&envelope.sender_email, MAX_SENDER_CHARS).to_string(),
            body_text: Some(content.body),
            snippet: Some(truncate_chars(&envelope.snippet, MAX_SNIPPET_CHARS).to_string()),
            received_at: envelope.received_at,
        };

        // One atomic unit: email row, its tasks, and the processed flag.
        let created = conn
            .transaction::<Option<usize>, anyhow::Error, _>(|conn| {
                async move {
                    let Some(email_row) = db::emails::insert(conn, new_email).await? else {
                        // Lost a race with a concurrent run; the constraint
                        // already holds the row.
                        return Ok(None);
                    };

                    let new_tasks: Vec<NewTask> = candidates
                        .into_iter()
                        .map(|candidate| NewTask {
                            user_id,
                            email_id: email_row.id,
                            description: candidate.description,
                            sender: sender.clone(),
                            priority: candidate.priority.as_str().to_string(),
                            category: candidate.category.as_str().to_string(),
                        })
                        .collect();

                    let created = db::tasks::insert_batch(conn, &new_tasks).await?;
                    db::emails::mark_processed(conn, email_row.id).await?;

                    Ok(Some(created))
                }
                .scope_boxed()
            })
            .await?;

        Ok(created)
    }
}
