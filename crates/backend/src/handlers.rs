//! HTTP handlers. The ingestion trigger is the interesting one; the rest is
//! a thin browse/complete surface over the persisted tasks and emails, plus
//! the OAuth connect flow that feeds the token vault.

use axum::{
    extract::{Json, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use shared_types::{
    ConnectInitResponse, CreateUserRequest, Email, IngestReport, Task, UserResponse,
};
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::NewUser;
use crate::services::IngestService;
use crate::AppState;

// User handlers

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    if payload.email.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(ApiError::bad_request("email and name are required"));
    }

    let mut conn = state.pool.get().await?;

    if db::users::get_by_email(&mut conn, &payload.email)
        .await?
        .is_some()
    {
        return Err(ApiError::bad_request("User already exists"));
    }

    let user = db::users::create(
        &mut conn,
        NewUser {
            email: payload.email,
            name: payload.name,
        },
    )
    .await?;

    Ok(Json(user.into()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserResponse>> {
    let mut conn = state.pool.get().await?;
    let user = db::users::get_by_id(&mut conn, user_id)
        .await
        .map_err(|_| ApiError::not_found("User"))?;

    Ok(Json(user.into()))
}

// Ingestion trigger

/// Run the ingestion pipeline for a user. Returns the run report, or a typed
/// rejection: 429 (rate limited), 401 (reconnect required), 502 (provider).
pub async fn process_emails(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<IngestReport>> {
    let report = IngestService::run(&state, user_id).await?;
    Ok(Json(report))
}

// Task handlers

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub completed: Option<bool>,
    pub processed: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let mut conn = state.pool.get().await?;

    let tasks = db::tasks::list_by_user(
        &mut conn,
        user_id,
        query.completed,
        Some(query.limit.unwrap_or(50)),
        query.offset,
    )
    .await?;

    Ok(Json(tasks))
}

pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let mut conn = state.pool.get().await?;
    let task = db::tasks::set_completed(&mut conn, task_id, true).await?;
    Ok(Json(task))
}

pub async fn reopen_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let mut conn = state.pool.get().await?;
    let task = db::tasks::set_completed(&mut conn, task_id, false).await?;
    Ok(Json(task))
}

// Email handlers

pub async fn list_emails(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Email>>> {
    let mut conn = state.pool.get().await?;

    let emails = db::emails::list_by_user(
        &mut conn,
        user_id,
        query.processed,
        Some(query.limit.unwrap_or(50)),
        query.offset,
    )
    .await?;

    Ok(Json(emails))
}

// OAuth flow

/// Start the Gmail OAuth consent flow for a user.
///
/// Returns a URL the client should redirect the user to; the user id rides
/// along in the `state` parameter.
pub async fn gmail_connect(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ConnectInitResponse>> {
    // Confirm the user exists before handing out a consent URL
    let mut conn = state.pool.get().await?;
    db::users::get_by_id(&mut conn, user_id)
        .await
        .map_err(|_| ApiError::not_found("User"))?;

    let auth_url = format!(
        "https://accounts.google.com/o/oauth2/v2/auth?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         scope={}&\
         access_type=offline&\
         prompt=consent&\
         state={}",
        urlencoding::encode(&state.config.google_client_id),
        urlencoding::encode(&state.config.oauth_redirect_uri),
        urlencoding::encode("https://www.googleapis.com/auth/gmail.readonly"),
        user_id
    );

    Ok(Json(ConnectInitResponse { auth_url }))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: String,
    pub state: Uuid,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Handle the Google OAuth callback: exchange the code for tokens, encrypt
/// them, and store them on the user identified by the `state` parameter.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    match handle_callback_inner(&state, params).await {
        Ok(()) => Redirect::to("/?gmail_connected=true").into_response(),
        Err(e) => {
            tracing::error!("OAuth callback error: {:?}", e);
            Redirect::to("/?auth_error=gmail_connect_failed").into_response()
        }
    }
}

async fn handle_callback_inner(state: &AppState, params: OAuthCallbackParams) -> ApiResult<()> {
    let config = &state.config;

    #[derive(serde::Serialize)]
    struct TokenRequest<'a> {
        code: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        redirect_uri: &'a str,
        grant_type: &'a str,
    }

    let token_response = state
        .http
        .post("https://oauth2.googleapis.com/token")
        .form(&TokenRequest {
            code: &params.code,
            client_id: &config.google_client_id,
            client_secret: &config.google_client_secret,
            redirect_uri: &config.oauth_redirect_uri,
            grant_type: "authorization_code",
        })
        .send()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Token exchange failed: {}", e)))?;

    if !token_response.status().is_success() {
        let status = token_response.status();
        let body = token_response.text().await.unwrap_or_default();
        return Err(ApiError::Internal(anyhow::anyhow!(
            "Token exchange rejected: {} - {}",
            status,
            body
        )));
    }

    let tokens: GoogleTokenResponse = token_response
        .json()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Invalid token response: {}", e)))?;

    let refresh_token = tokens.refresh_token.ok_or_else(|| {
        ApiError::bad_request("No refresh token received; re-run consent with prompt=consent")
    })?;

    // Plaintext tokens exist only here; only ciphertext reaches the database.
    let encrypted_access = state.vault.encrypt(&tokens.access_token)?;
    let encrypted_refresh = state.vault.encrypt(&refresh_token)?;
    let expiry = Utc::now() + Duration::seconds(tokens.expires_in.unwrap_or(3600));

    let mut conn = state.pool.get().await?;
    db::users::store_gmail_tokens(
        &mut conn,
        params.state,
        &encrypted_access,
        &encrypted_refresh,
        expiry,
    )
    .await?;

    tracing::info!("Stored Gmail tokens for user {}", params.state);
    Ok(())
}
