// OAuth2 refresh-token exchange.
//
// The long-lived refresh token (obtained once, outside this tool) is
// traded for short-lived access tokens. Tokens are cached and refreshed
// shortly before they expire, or immediately after the API rejects one.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::store::StoreError;

pub const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// App identity and refresh token used to mint access tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_key: String,
    /// Not needed for apps authorized with PKCE.
    pub app_secret: Option<String>,
    pub refresh_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &self.app_key)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn token_from_response(resp: TokenResponse, now: DateTime<Utc>) -> AccessToken {
    AccessToken {
        token: resp.access_token,
        expires_at: now + Duration::seconds(resp.expires_in),
    }
}

fn oauth_error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(err) => match err.error_description {
            Some(desc) => format!("{}: {}", err.error, desc),
            None => err.error,
        },
        Err(_) if body.trim().is_empty() => format!("token refresh failed with {status}"),
        Err(_) => format!("token refresh failed with {status}: {}", body.trim()),
    }
}

/// Hands out valid access tokens, refreshing them as needed.
pub struct TokenSource {
    client: Client,
    credentials: Credentials,
    token_url: String,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn new(client: Client, credentials: Credentials) -> Self {
        Self::with_token_url(client, credentials, TOKEN_URL)
    }

    /// Like `new`, but exchanges tokens at `token_url`.
    pub fn with_token_url(client: Client, credentials: Credentials, token_url: &str) -> Self {
        Self {
            client,
            credentials,
            token_url: token_url.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a usable access token, refreshing it when missing or stale.
    pub fn access_token(&self) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }
        let fresh = self.refresh()?;
        let value = fresh.token.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Drops the cached token so the next call refreshes.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn refresh(&self) -> Result<AccessToken, StoreError> {
        debug!(app_key = %self.credentials.app_key, "refreshing access token");
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("client_id", self.credentials.app_key.as_str()),
        ];
        if let Some(secret) = &self.credentials.app_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let res = self.client.post(&self.token_url).form(&form).send()?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(StoreError::Auth(oauth_error_message(status, &body)));
        }
        let body: TokenResponse = res.json()?;
        Ok(token_from_response(body, Utc::now()))
    }
}
