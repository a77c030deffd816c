//! Encryption at rest for Gmail OAuth tokens, plus access-token resolution.
//!
//! The vault derives one AES-256 key per process from `SECRET_KEY` and
//! `ENCRYPTION_SALT` and encrypts/decrypts token strings. Decryption failure
//! is deliberately soft: a token that cannot be decrypted is treated the same
//! as a missing token ("not connected"), never a crash.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::Deserialize;
use sha2::Sha256;
use shared_types::User;

use crate::config::AppConfig;
use crate::error::IngestError;

/// PBKDF2 iteration count for key derivation.
const KDF_ITERATIONS: u32 = 100_000;
/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts OAuth tokens with AES-256-GCM under a key derived
/// once from the application secret.
pub struct TokenVault {
    key: [u8; 32],
}

impl TokenVault {
    /// Derive the vault key from a secret and salt (PBKDF2-HMAC-SHA256).
    pub fn new(secret: &str, salt: &str) -> Self {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt.as_bytes(), KDF_ITERATIONS, &mut key);
        Self { key }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.secret_key, &config.encryption_salt)
    }

    /// Encrypt a token string. Output is base64(nonce || ciphertext || tag).
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| anyhow!("Invalid vault key: {}", e))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| anyhow!("Token encryption failed"))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(payload))
    }

    /// Decrypt a stored token. Returns `None` on any failure (bad encoding,
    /// truncated payload, wrong key, tampered ciphertext).
    pub fn decrypt(&self, encrypted: &str) -> Option<String> {
        let payload = base64::engine::general_purpose::STANDARD
            .decode(encrypted)
            .ok()?;
        if payload.len() <= NONCE_LEN {
            return None;
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new_from_slice(&self.key).ok()?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .ok()?;

        String::from_utf8(plaintext).ok()
    }
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVault")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A usable plaintext access token, plus the re-encrypted credential update
/// to persist when a refresh happened.
pub struct ResolvedAccess {
    pub access_token: String,
    pub refreshed: Option<RefreshedCredential>,
}

/// New credential state produced by a token refresh. The access token is
/// already encrypted; plaintext never leaves this module except in
/// `ResolvedAccess::access_token`.
pub struct RefreshedCredential {
    pub encrypted_access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// Resolve a valid plaintext access token for a user, refreshing it through
/// Google's token endpoint when the stored expiry is in the past.
///
/// Missing or undecryptable tokens and failed refreshes all surface as
/// `IngestError::Auth` — the caller reports "reconnect required".
pub async fn resolve_access_token(
    client: &reqwest::Client,
    vault: &TokenVault,
    user: &User,
    config: &AppConfig,
) -> Result<ResolvedAccess, IngestError> {
    if !user.gmail_connected {
        return Err(IngestError::Auth("Gmail not connected".to_string()));
    }

    let access_token = user
        .gmail_access_token
        .as_deref()
        .and_then(|t| vault.decrypt(t))
        .ok_or_else(|| IngestError::Auth("Stored access token unavailable".to_string()))?;

    let expired = user
        .gmail_token_expiry
        .map(|expiry| expiry <= Utc::now())
        .unwrap_or(false);

    if !expired {
        return Ok(ResolvedAccess {
            access_token,
            refreshed: None,
        });
    }

    let refresh_token = user
        .gmail_refresh_token
        .as_deref()
        .and_then(|t| vault.decrypt(t))
        .ok_or_else(|| IngestError::Auth("Stored refresh token unavailable".to_string()))?;

    tracing::debug!("Access token expired for user {}, refreshing", user.id);

    let tokens = exchange_refresh_token(client, config, &refresh_token)
        .await
        .map_err(|e| {
            tracing::warn!("Token refresh failed for user {}: {:#}", user.id, e);
            IngestError::Auth("Token refresh failed, reconnect required".to_string())
        })?;

    let expires_at = Utc::now() + Duration::seconds(tokens.expires_in.unwrap_or(3600));
    let encrypted_access_token = vault
        .encrypt(&tokens.access_token)
        .map_err(IngestError::Internal)?;

    Ok(ResolvedAccess {
        access_token: tokens.access_token,
        refreshed: Some(RefreshedCredential {
            encrypted_access_token,
            expires_at,
        }),
    })
}

async fn exchange_refresh_token(
    client: &reqwest::Client,
    config: &AppConfig,
    refresh_token: &str,
) -> Result<GoogleTokenResponse> {
    #[derive(serde::Serialize)]
    struct RefreshRequest<'a> {
        client_id: &'a str,
        client_secret: &'a str,
        refresh_token: &'a str,
        grant_type: &'a str,
    }

    let response = client
        .post("https://oauth2.googleapis.com/token")
        .form(&RefreshRequest {
            client_id: &config.google_client_id,
            client_secret: &config.google_client_secret,
            refresh_token,
            grant_type: "refresh_token",
        })
        .send()
        .await
        .context("Token refresh request failed")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Token refresh rejected: {} - {}", status, body));
    }

    response
        .json::<GoogleTokenResponse>()
        .await
        .context("Invalid token refresh response")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> TokenVault {
        TokenVault::new("test-secret", "test-salt")
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let vault = test_vault();
        for plaintext in ["x", "ya29.a0AfH6SMB-token", "unicode: héllo ✓"] {
            let encrypted = vault.encrypt(plaintext).unwrap();
            assert_ne!(encrypted, plaintext);
            assert_eq!(vault.decrypt(&encrypted).as_deref(), Some(plaintext));
        }
    }

    #[test]
    fn test_equal_plaintexts_produce_distinct_ciphertexts() {
        let vault = test_vault();
        let a = vault.encrypt("same-token").unwrap();
        let b = vault.encrypt("same-token").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_garbage_returns_none() {
        let vault = test_vault();
        assert_eq!(vault.decrypt("not base64 at all!!"), None);
        assert_eq!(vault.decrypt(""), None);
        assert_eq!(
            vault.decrypt(&base64::engine::general_purpose::STANDARD.encode([0u8; 4])),
            None
        );
    }

    #[test]
    fn test_decrypt_tampered_ciphertext_returns_none() {
        let vault = test_vault();
        let encrypted = vault.encrypt("secret-token").unwrap();
        let mut payload = base64::engine::general_purpose::STANDARD
            .decode(&encrypted)
            .unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        let tampered = base64::engine::general_purpose::STANDARD.encode(payload);
        assert_eq!(vault.decrypt(&tampered), None);
    }

    #[test]
    fn test_decrypt_with_wrong_key_returns_none() {
        let vault = test_vault();
        let other = TokenVault::new("different-secret", "test-salt");
        let encrypted = vault.encrypt("secret-token").unwrap();
        assert_eq!(other.decrypt(&encrypted), None);
    }
}
