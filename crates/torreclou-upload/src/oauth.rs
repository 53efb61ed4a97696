//! Google Drive credential bookkeeping (§4.8 step 4: "Drive uses an OAuth
//! refresh-token grant with bookkeeping for expiry"). The refresh token
//! itself never expires from the worker's point of view; only the short-
//! lived access token obtained from it does, so we cache the access token
//! plus its expiry and only call Google once that has elapsed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::Deserialize;
use tokio::sync::Mutex;
use torreclou_core::error::TorreClouError;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Shape of a Google Drive `StorageProfile.credentialsJson` blob.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Holds a refreshed access token, re-exchanging the refresh token once the
/// cached one is within a minute of expiry.
pub struct DriveTokenProvider {
    client: BasicClient,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl DriveTokenProvider {
    pub fn new(credentials: &DriveCredentials) -> Result<Self, TorreClouError> {
        let client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string()).map_err(|_| TorreClouError::InvalidCredentialsJson)?,
            Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string()).map_err(|_| TorreClouError::InvalidCredentialsJson)?),
        );

        Ok(Self { client, cached: Arc::new(Mutex::new(None)) })
    }

    /// Returns a currently-valid access token, refreshing via the Drive
    /// refresh-token grant if none is cached or the cached one is about to
    /// expire.
    pub async fn access_token(&self, refresh_token: &str) -> Result<String, TorreClouError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + Duration::from_secs(60) {
                return Ok(token.access_token.clone());
            }
        }

        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|_| TorreClouError::TokenExchangeFailed)?;

        let expires_in = response.expires_in().unwrap_or(Duration::from_secs(3600));
        let access_token = response.access_token().secret().clone();
        *cached = Some(CachedToken { access_token: access_token.clone(), expires_at: Instant::now() + expires_in });

        Ok(access_token)
    }
}
