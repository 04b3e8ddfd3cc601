use crate::error::{ClientError, DeviceCodeError};
use crate::tenant_url;
use crate::token::TokenPair;
use diagnostics::*;
use oauth2::basic::BasicClient;
use oauth2::reqwest::http_client;
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, DeviceAuthorizationUrl, DeviceCodeErrorResponseType,
    RequestTokenError, Scope, StandardDeviceAuthorizationResponse, TokenResponse, TokenUrl,
};
use std::time::Duration;

const SCOPES: [&str; 3] = ["openid", "email", "offline_access"];

/// Codes a user needs to authorize this device, plus the state needed to
/// poll for the resulting tokens.
pub struct DeviceGrant {
    pub verification_uri: String,
    pub user_code: String,
    pub expires_in: Duration,
    details: StandardDeviceAuthorizationResponse,
}

/// Device-code OAuth2 handshake against an Auth0-style tenant
pub struct DeviceAuthorizer {
    oauth_client: BasicClient,
    audience: String,
}

impl DeviceAuthorizer {
    pub fn for_tenant(
        auth_domain: &str,
        client_id: String,
        client_secret: String,
        audience: String,
    ) -> Result<Self, ClientError> {
        Self::new(&tenant_url(auth_domain), client_id, client_secret, audience)
    }

    /// Build against an explicit base URL such as `https://tenant.auth0.com`.
    pub fn new(
        base_url: &str,
        client_id: String,
        client_secret: String,
        audience: String,
    ) -> Result<Self, ClientError> {
        let base = base_url.trim_end_matches('/');
        let endpoint = |e: url::ParseError| ClientError::OAuthEndpoint(e.to_string());

        let oauth_client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            AuthUrl::new(format!("{}/authorize", base)).map_err(endpoint)?,
            Some(TokenUrl::new(format!("{}/oauth/token", base)).map_err(endpoint)?),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_device_authorization_url(
            DeviceAuthorizationUrl::new(format!("{}/oauth/device/code", base)).map_err(endpoint)?,
        );

        Ok(DeviceAuthorizer {
            oauth_client,
            audience,
        })
    }

    /// Ask the provider for a user code and verification URL.
    pub fn request_code(&self) -> Result<DeviceGrant, DeviceCodeError> {
        let mut request = self
            .oauth_client
            .exchange_device_code()
            .map_err(|e| DeviceCodeError::Unknown(e.to_string()))?
            .add_extra_param("audience", self.audience.as_str());
        for scope in SCOPES {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let details: StandardDeviceAuthorizationResponse = match request.request(http_client) {
            Ok(details) => details,
            Err(RequestTokenError::ServerResponse(resp)) => {
                let description = resp
                    .error_description()
                    .cloned()
                    .unwrap_or_else(|| format!("{:?}", resp.error()));
                return Err(DeviceCodeError::NotGenerated(description));
            }
            Err(RequestTokenError::Request(oauth2::reqwest::Error::Reqwest(e))) => {
                return Err(if e.is_timeout() {
                    DeviceCodeError::Timeout(e.to_string())
                } else if e.is_connect() {
                    DeviceCodeError::Connection(e.to_string())
                } else {
                    DeviceCodeError::Unknown(e.to_string())
                });
            }
            Err(RequestTokenError::Parse(e, _)) => return Err(DeviceCodeError::Http(e.to_string())),
            Err(e) => return Err(DeviceCodeError::Unknown(e.to_string())),
        };

        debug!("Device code issued, polling interval {interval}s", interval: details.interval().as_secs());
        Ok(DeviceGrant {
            verification_uri: details.verification_uri().as_str().to_string(),
            user_code: details.user_code().secret().clone(),
            expires_in: details.expires_in(),
            details,
        })
    }

    /// Poll until the user authorizes the device, the code expires, or the
    /// provider refuses.
    pub fn await_tokens(&self, grant: &DeviceGrant) -> Result<TokenPair, DeviceCodeError> {
        let token = match self
            .oauth_client
            .exchange_device_access_token(&grant.details)
            .request(http_client, std::thread::sleep, None)
        {
            Ok(token) => token,
            Err(RequestTokenError::ServerResponse(resp)) => {
                return Err(match resp.error() {
                    DeviceCodeErrorResponseType::ExpiredToken => DeviceCodeError::Expired,
                    DeviceCodeErrorResponseType::AccessDenied => DeviceCodeError::AccessDenied(
                        resp.error_description().cloned().unwrap_or_default(),
                    ),
                    other => DeviceCodeError::Unknown(format!("{:?}", other)),
                });
            }
            Err(RequestTokenError::Other(msg)) if msg.contains("expired") => {
                return Err(DeviceCodeError::Expired);
            }
            Err(RequestTokenError::Request(oauth2::reqwest::Error::Reqwest(e))) => {
                return Err(if e.is_timeout() {
                    DeviceCodeError::Timeout(e.to_string())
                } else if e.is_connect() {
                    DeviceCodeError::Connection(e.to_string())
                } else {
                    DeviceCodeError::Unknown(e.to_string())
                });
            }
            Err(e) => return Err(DeviceCodeError::Unknown(e.to_string())),
        };

        let refresh_token = token
            .refresh_token()
            .map(|t| t.secret().clone())
            .ok_or(DeviceCodeError::MissingRefreshToken)?;
        info!("Device authorization complete");

        Ok(TokenPair::new(token.access_token().secret().clone(), refresh_token))
    }
}
