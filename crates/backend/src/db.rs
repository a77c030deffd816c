use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use shared_types::{Email, Task, User};
use uuid::Uuid;

use crate::models::{NewEmail, NewTask, NewUser};

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    // Parse the connection string and connect with TLS
    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    // Spawn the connection task
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    // Build the async connection from the tokio-postgres client
    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool() -> anyhow::Result<DbPool> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable must be set"))?;

    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

// User database operations
pub mod users {
    use super::*;

    pub async fn get_by_id(conn: &mut AsyncPgConnection, user_id: Uuid) -> anyhow::Result<User> {
        use crate::schema::users::dsl::*;

        let user = users.filter(id.eq(user_id)).first::<User>(conn).await?;

        Ok(user)
    }

    pub async fn get_by_email(
        conn: &mut AsyncPgConnection,
        email_addr: &str,
    ) -> anyhow::Result<Option<User>> {
        use crate::schema::users::dsl::*;

        let user = users
            .filter(email.eq(email_addr))
            .first::<User>(conn)
            .await
            .optional()?;

        Ok(user)
    }

    pub async fn create(conn: &mut AsyncPgConnection, new_user: NewUser) -> anyhow::Result<User> {
        use crate::schema::users::dsl::*;

        let user = diesel::insert_into(users)
            .values(&new_user)
            .get_result::<User>(conn)
            .await?;

        Ok(user)
    }

    /// Store freshly-obtained OAuth tokens (already encrypted by the vault)
    /// and mark the account as connected.
    pub async fn store_gmail_tokens(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        encrypted_access: &str,
        encrypted_refresh: &str,
        expiry: DateTime<Utc>,
    ) -> anyhow::Result<User> {
        use crate::schema::users::dsl::*;

        let updated = diesel::update(users.filter(id.eq(user_id)))
            .set((
                gmail_access_token.eq(Some(encrypted_access)),
                gmail_refresh_token.eq(Some(encrypted_refresh)),
                gmail_token_expiry.eq(Some(expiry)),
                gmail_connected.eq(true),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<User>(conn)
            .await?;

        Ok(updated)
    }

    /// Persist a refreshed access token. Last writer wins on the expiry.
    pub async fn update_access_token(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        encrypted_access: &str,
        expiry: DateTime<Utc>,
    ) -> anyhow::Result<User> {
        use crate::schema::users::dsl::*;

        let updated = diesel::update(users.filter(id.eq(user_id)))
            .set((
                gmail_access_token.eq(Some(encrypted_access)),
                gmail_token_expiry.eq(Some(expiry)),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<User>(conn)
            .await?;

        Ok(updated)
    }
}

// Email database operations
pub mod emails {
    use super::*;

    /// Insert a new email, returning it. Uses ON CONFLICT DO NOTHING on
    /// `(user_id, gmail_id)` so a repeat ingestion is a no-op, not a
    /// duplicate insert.
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_email: NewEmail,
    ) -> anyhow::Result<Option<Email>> {
        use crate::schema::emails::dsl::*;

        let result = diesel::insert_into(emails)
            .values(&new_email)
            .on_conflict((user_id, gmail_id))
            .do_nothing()
            .get_result::<Email>(conn)
            .await
            .optional()?;

        Ok(result)
    }

    /// Check whether a message has already been ingested for this user.
    pub async fn exists(
        conn: &mut AsyncPgConnection,
        user_uuid: Uuid,
        gmail_message_id: &str,
    ) -> anyhow::Result<bool> {
        use crate::schema::emails::dsl::*;

        let count: i64 = emails
            .filter(user_id.eq(user_uuid))
            .filter(gmail_id.eq(gmail_message_id))
            .count()
            .get_result(conn)
            .await?;

        Ok(count > 0)
    }

    pub async fn mark_processed(
        conn: &mut AsyncPgConnection,
        email_id: Uuid,
    ) -> anyhow::Result<Email> {
        use crate::schema::emails::dsl::*;

        let updated = diesel::update(emails.filter(id.eq(email_id)))
            .set((processed.eq(true), processed_at.eq(Some(Utc::now()))))
            .get_result::<Email>(conn)
            .await?;

        Ok(updated)
    }

    pub async fn list_by_user(
        conn: &mut AsyncPgConnection,
        user_uuid: Uuid,
        processed_filter: Option<bool>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> anyhow::Result<Vec<Email>> {
        use crate::schema::emails::dsl::*;

        let mut query = emails
            .filter(user_id.eq(user_uuid))
            .order_by(received_at.desc())
            .into_boxed();

        if let Some(p) = processed_filter {
            query = query.filter(processed.eq(p));
        }
        if let Some(l) = limit {
            query = query.limit(l);
        }
        if let Some(o) = offset {
            query = query.offset(o);
        }

        let items = query.load::<Email>(conn).await?;
        Ok(items)
    }

    pub async fn get_by_id(conn: &mut AsyncPgConnection, email_id: Uuid) -> anyhow::Result<Email> {
        use crate::schema::emails::dsl::*;

        let item = emails.filter(id.eq(email_id)).first::<Email>(conn).await?;
        Ok(item)
    }
}

// Task database operations
pub mod tasks {
    use super::*;

    pub async fn insert_batch(
        conn: &mut AsyncPgConnection,
        new_tasks: &[NewTask],
    ) -> anyhow::Result<usize> {
        use crate::schema::tasks::dsl::*;

        if new_tasks.is_empty() {
            return Ok(0);
        }

        let inserted = diesel::insert_into(tasks)
            .values(new_tasks)
            .execute(conn)
            .await?;

        Ok(inserted)
    }

    pub async fn get_by_id(conn: &mut AsyncPgConnection, task_id: Uuid) -> anyhow::Result<Task> {
        use crate::schema::tasks::dsl::*;

        let task = tasks.filter(id.eq(task_id)).first::<Task>(conn).await?;

        Ok(task)
    }

    pub async fn list_by_user(
        conn: &mut AsyncPgConnection,
        user_uuid: Uuid,
        completed_filter: Option<bool>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> anyhow::Result<Vec<Task>> {
        use crate::schema::tasks::dsl::*;

        let mut query = tasks
            .filter(user_id.eq(user_uuid))
            .order_by(created_at.desc())
            .into_boxed();

        if let Some(c) = completed_filter {
            query = query.filter(completed.eq(c));
        }
        if let Some(l) = limit {
            query = query.limit(l);
        }
        if let Some(o) = offset {
            query = query.offset(o);
        }

        let items = query.load::<Task>(conn).await?;
        Ok(items)
    }

    pub async fn set_completed(
        conn: &mut AsyncPgConnection,
        task_id: Uuid,
        is_completed: bool,
    ) -> anyhow::Result<Task> {
        use crate::schema::tasks::dsl::*;

        let completion_time = if is_completed { Some(Utc::now()) } else { None };

        let updated = diesel::update(tasks.filter(id.eq(task_id)))
            .set((
                completed.eq(is_completed),
                completed_at.eq(completion_time),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<Task>(conn)
            .await?;

        Ok(updated)
    }
}
