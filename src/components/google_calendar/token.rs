use crate::config::Config;
use crate::error::{provider_error, Error, SyncResult};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Access tokens are treated as expired this long before they actually are
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth credential handed over by the authorization flow
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Credential that only holds a refresh token
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: None,
            refresh_token: refresh_token.into(),
            expires_at: None,
        }
    }

    /// Access token still usable at `now`
    fn valid_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        match self.expires_at {
            Some(expires_at) if expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) <= now => None,
            _ => Some(token),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// Keeps the provider credential and refreshes its access token
pub struct TokenManager {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    credential: RwLock<Option<Credential>>,
}

impl TokenManager {
    pub fn new(config: &Config) -> Self {
        let credential = config.google_refresh_token.as_ref().map(|refresh_token| Credential {
            access_token: config.google_access_token.clone(),
            refresh_token: refresh_token.clone(),
            expires_at: None,
        });

        Self {
            client: Client::new(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            token_url: config.google_token_url.clone(),
            credential: RwLock::new(credential),
        }
    }

    /// Whether a usable credential is loaded
    pub async fn is_authorized(&self) -> bool {
        self.credential.read().await.is_some()
    }

    /// Replace the credential (called by whatever runs the OAuth flow)
    pub async fn set_credential(&self, credential: Credential) {
        *self.credential.write().await = Some(credential);
        info!("Calendar credential updated");
    }

    /// Forget the current access token so the next request refreshes it
    pub async fn invalidate_access_token(&self) {
        if let Some(credential) = self.credential.write().await.as_mut() {
            credential.access_token = None;
        }
    }

    /// Get a valid access token, refreshing it when needed
    pub async fn access_token(&self) -> SyncResult<String> {
        let refresh_token = {
            let guard = self.credential.read().await;
            let credential = guard
                .as_ref()
                .ok_or_else(|| Error::Unauthorized("No calendar credential loaded".to_string()))?;
            if let Some(token) = credential.valid_access_token(Utc::now()) {
                return Ok(token.to_string());
            }
            credential.refresh_token.clone()
        };

        self.refresh(&refresh_token).await
    }

    /// Exchange the refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> SyncResult<String> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| provider_error(&format!("Failed to refresh token: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());

            // Revoked or invalid refresh token, nothing to retry with
            if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
                warn!("Refresh token rejected: HTTP {} - {}", status, error_body);
                *self.credential.write().await = None;
                return Err(Error::Unauthorized(format!(
                    "Refresh token rejected (HTTP {})",
                    status
                )));
            }

            return Err(provider_error(&format!(
                "Failed to refresh token: HTTP {} - {}",
                status, error_body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| provider_error(&format!("Failed to parse token response: {}", e)))?;

        let expires_at = Utc::now() + Duration::seconds(token.expires_in.unwrap_or(3600));

        let mut guard = self.credential.write().await;
        let refresh_token = token
            .refresh_token
            .unwrap_or_else(|| refresh_token.to_string());
        *guard = Some(Credential {
            access_token: Some(token.access_token.clone()),
            refresh_token,
            expires_at: Some(expires_at),
        });

        info!("Refreshed calendar access token, valid until {}", expires_at);
        Ok(token.access_token)
    }
}
