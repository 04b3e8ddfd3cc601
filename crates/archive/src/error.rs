use thiserror::Error;

/// Building a client failed
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid OAuth2 endpoint: {0}")]
    OAuthEndpoint(String),
}

/// The archive's holdings could not be established. Callers must not
/// upload anything for the deployment while this is the case.
#[derive(Debug, Error)]
pub enum HoldingsUnavailable {
    #[error("holdings request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("holdings request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("holdings response from {url} could not be decoded: {reason}")]
    Malformed { url: String, reason: String },

    #[error("invalid holdings URL for deployment {deployment_id}: {source}")]
    InvalidUrl {
        deployment_id: String,
        #[source]
        source: url::ParseError,
    },
}

/// Refreshing the access token failed
#[derive(Debug, Error)]
pub enum AccessCodeError {
    #[error("Http Error while refreshing token")]
    Http(#[source] reqwest::Error),

    #[error("Connection Error while refreshing token")]
    Connection(#[source] reqwest::Error),

    #[error("Timeout error while refreshing token")]
    Timeout(#[source] reqwest::Error),

    #[error("Unknown error while refreshing token")]
    Unknown(#[source] reqwest::Error),

    #[error("Refresh token not generated. \nError: {0}")]
    Rejected(String),

    #[error("Refresh response did not contain an access token")]
    MissingAccessToken,
}

impl AccessCodeError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AccessCodeError::Timeout(err)
        } else if err.is_connect() {
            AccessCodeError::Connection(err)
        } else if err.is_status() {
            AccessCodeError::Http(err)
        } else {
            AccessCodeError::Unknown(err)
        }
    }
}

/// The device-code handshake failed
#[derive(Debug, Error)]
pub enum DeviceCodeError {
    #[error("Device code not generated. \nError: {0}")]
    NotGenerated(String),

    #[error("HTTP error while generating Device Code")]
    Http(String),

    #[error("Connection error while generating Device Code")]
    Connection(String),

    #[error("Timeout error while generating Device Code")]
    Timeout(String),

    #[error("Unknown error while generating device code")]
    Unknown(String),

    #[error("Device code is expired. Start APDS Pusher again to obtain new code")]
    Expired,

    #[error("Device authorization was denied: {0}")]
    AccessDenied(String),

    #[error("Authorization server did not issue a refresh token")]
    MissingRefreshToken,
}
