use crate::error::{AccessCodeError, ClientError};
use crate::{REQUEST_TIMEOUT, tenant_url};
use diagnostics::*;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize, Debug)]
struct RefreshResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Tokens issued by the device-code handshake
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: String, refresh_token: String) -> Self {
        TokenPair {
            access_token,
            refresh_token,
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Exchanges a refresh token for a fresh access token.
///
/// Never retries; the caller owns the retry policy.
pub struct TokenRefresher {
    http_client: reqwest::blocking::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl TokenRefresher {
    /// Refresher for `https://{auth_domain}/oauth/token`.
    pub fn for_tenant(
        auth_domain: &str,
        client_id: String,
        client_secret: String,
    ) -> Result<Self, ClientError> {
        Self::new(format!("{}/oauth/token", tenant_url(auth_domain)), client_id, client_secret)
    }

    pub fn new(token_url: String, client_id: String, client_secret: String) -> Result<Self, ClientError> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(TokenRefresher {
            http_client,
            token_url,
            client_id,
            client_secret,
        })
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<String, AccessCodeError> {
        let payload = RefreshRequest {
            grant_type: "refresh_token",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            refresh_token,
        };

        debug!("Requesting a new access token from {url}", url: self.token_url.as_str());
        let body: RefreshResponse = self
            .http_client
            .post(&self.token_url)
            .json(&payload)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json())
            .map_err(AccessCodeError::from_transport)?;

        if body.error.is_some() {
            let description = body
                .error_description
                .or(body.error)
                .unwrap_or_default();
            return Err(AccessCodeError::Rejected(description));
        }

        let access_token = body.access_token.ok_or(AccessCodeError::MissingAccessToken)?;
        info!("Access token refreshed");
        Ok(access_token)
    }
}
