//! Stored OAuth user credential with refresh-token renewal.
//!
//! The credential file is the `authorized_user` JSON written by Google's
//! client libraries (`token`, `refresh_token`, `token_uri`, `client_id`,
//! `client_secret`, `expiry`, ...). Unknown fields are preserved when the
//! refreshed credential is written back. Obtaining the first credential
//! (the browser consent flow) is out of scope; without a stored credential
//! every call fails with [`AuthError::MissingCredential`].

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tube_sync_core::contract::{Authenticator, Token};
use tube_sync_core::error::AuthError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl StoredCredential {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.as_deref().and_then(parse_expiry)
    }

    /// A token is usable when present and not within the expiry margin.
    /// A token without an expiry is trusted.
    pub fn usable_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.token.as_deref().filter(|t| !t.is_empty())?;
        match self.expires_at() {
            Some(at) if at - Duration::seconds(EXPIRY_MARGIN_SECS) <= now => None,
            _ => Some(token),
        }
    }
}

/// Accepts RFC 3339 and the zone-less ISO form, read as UTC.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct StoredCredentialAuth {
    path: PathBuf,
    client: reqwest::Client,
    cached: Mutex<Option<StoredCredential>>,
}

impl StoredCredentialAuth {
    pub fn new(path: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            path: path.into(),
            client,
            cached: Mutex::new(None),
        }
    }

    fn read(&self) -> Result<StoredCredential, AuthError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::MissingCredential(self.path.clone()))
            }
            Err(e) => return Err(AuthError::Invalid(format!("{}: {e}", self.path.display()))),
        };
        serde_json::from_str(&content)
            .map_err(|e| AuthError::Invalid(format!("{}: {e}", self.path.display())))
    }

    async fn refresh(&self, credential: &mut StoredCredential) -> Result<(), AuthError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            credential.refresh_token.clone(),
            credential.client_id.clone(),
            credential.client_secret.clone(),
        ) else {
            return Err(AuthError::RefreshFailed(
                "credential has no refresh token or client identity".to_string(),
            ));
        };

        info!(token_uri = %credential.token_uri, "Refreshing access token");
        let response = self
            .client
            .post(&credential.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(format!("status {}: {body}", status.as_u16())));
        }
        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        credential.token = Some(refreshed.access_token);
        credential.expiry = refreshed.expires_in.map(|secs| {
            (Utc::now() + Duration::seconds(secs)).to_rfc3339_opts(SecondsFormat::Micros, true)
        });
        if let Some(rotated) = refreshed.refresh_token {
            credential.refresh_token = Some(rotated);
        }
        Ok(())
    }
}

/// Atomically rewrites the credential file.
fn write_credential(path: &Path, credential: &StoredCredential) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let body = serde_json::to_vec_pretty(credential).map_err(std::io::Error::other)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl Authenticator for StoredCredentialAuth {
    async fn get_valid_token(&self) -> Result<Token, AuthError> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = Some(self.read()?);
        }
        let credential = cached
            .as_mut()
            .ok_or_else(|| AuthError::Invalid("credential not loaded".to_string()))?;

        if let Some(token) = credential.usable_token(Utc::now()) {
            return Ok(Token {
                access_token: token.to_string(),
            });
        }

        self.refresh(credential).await?;
        if let Err(e) = write_credential(&self.path, credential) {
            warn!(path = %self.path.display(), error = %e, "Cannot store refreshed credential");
        }
        let access_token = credential
            .token
            .clone()
            .ok_or_else(|| AuthError::Invalid("refresh returned no token".to_string()))?;
        Ok(Token { access_token })
    }
}
