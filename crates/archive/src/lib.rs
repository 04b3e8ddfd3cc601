pub mod client;
pub mod device;
pub mod error;
pub mod models;
pub mod token;

pub use client::ArchiveClient;
pub use device::{DeviceAuthorizer, DeviceGrant};
pub use error::{AccessCodeError, ClientError, DeviceCodeError, HoldingsUnavailable};
pub use models::{UploadFailure, UploadMode, UploadOutcome, classify_response};
pub use token::{TokenPair, TokenRefresher};

use std::time::Duration;

/// Per-request timeout for every archive and token call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Base URL of an OAuth2 tenant. Bare domains are served over https.
pub fn tenant_url(auth_domain: &str) -> String {
    let domain = auth_domain.trim_end_matches('/');
    if domain.starts_with("https://") || domain.starts_with("http://") {
        domain.to_string()
    } else {
        format!("https://{}", domain)
    }
}
