//! OAuth token exchange and refresh against Square.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{SquareError, SquareResult};

/// OAuth application credentials for the connected app.
#[derive(Debug, Clone)]
pub struct SquareCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// Token response from Square's OAuth endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    merchant_id: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: Option<String>,
}

/// A granted token pair.
///
/// `refresh_token` is `None` when Square did not rotate it; callers keep the
/// previous one in that case.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub merchant_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Client for Square's OAuth token endpoint.
#[derive(Debug)]
pub struct OAuthClient {
    http_client: reqwest::Client,
    base_url: String,
    credentials: SquareCredentials,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        credentials: SquareCredentials,
    ) -> SquareResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SquareError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Exchanges an authorization code for a token pair.
    #[instrument(skip(self, code, redirect_uri))]
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> SquareResult<TokenGrant> {
        self.request_token(&[
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose_secret()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    /// Obtains a fresh access token from a stored refresh token.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> SquareResult<TokenGrant> {
        self.request_token(&[
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose_secret()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
        .map_err(|err| match err {
            SquareError::Auth(msg) => SquareError::TokenRefresh(msg),
            other => other,
        })
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> SquareResult<TokenGrant> {
        let token_url = format!("{}/oauth2/token", self.base_url);

        let response = self
            .http_client
            .post(&token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| SquareError::Auth(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SquareError::Auth(format!(
                "token request failed with status {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SquareError::Auth(format!("failed to parse token response: {e}")))?;

        let expires_at = token
            .expires_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        debug!(
            merchant_id = token.merchant_id.as_deref().unwrap_or("unknown"),
            rotated_refresh = token.refresh_token.is_some(),
            "token grant received"
        );

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            merchant_id: token.merchant_id,
            expires_at,
        })
    }
}
