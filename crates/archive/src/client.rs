use crate::error::{ClientError, HoldingsUnavailable};
use crate::models::{HoldingsResponse, UploadFailure, UploadMode, UploadOutcome, classify_response};
use crate::REQUEST_TIMEOUT;
use diagnostics::*;
use reqwest::blocking::multipart::{Form, Part};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// Blocking archive API client
pub struct ArchiveClient {
    http_client: reqwest::blocking::Client,
    base_url: Url,
}

impl ArchiveClient {
    /// Create a client for the archive rooted at `base_url`.
    ///
    /// Endpoint paths are appended to the base, so a missing trailing
    /// slash does not drop the base's last path segment.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|source| ClientError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        let http_client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(ArchiveClient {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the set of filenames the archive holds for a deployment.
    pub fn existing_files(&self, deployment_id: &str) -> Result<HashSet<String>, HoldingsUnavailable> {
        let url = self
            .holdings_url(deployment_id)
            .map_err(|source| HoldingsUnavailable::InvalidUrl {
                deployment_id: deployment_id.to_string(),
                source,
            })?;
        debug!("Calling archive holdings endpoint {url}", url: url.as_str());

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .map_err(|source| HoldingsUnavailable::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HoldingsUnavailable::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().map_err(|source| HoldingsUnavailable::Request {
            url: url.to_string(),
            source,
        })?;
        let holdings: HoldingsResponse =
            serde_json::from_str(&text).map_err(|e| HoldingsUnavailable::Malformed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        holdings
            .filenames()
            .map_err(|e| HoldingsUnavailable::Malformed {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    /// Perform exactly one upload attempt and classify the answer.
    pub fn upload(
        &self,
        file: &Path,
        deployment_id: &str,
        access_token: &str,
        mode: UploadMode,
    ) -> UploadOutcome {
        let url = match self.upload_url(file, deployment_id, mode) {
            Ok(url) => url,
            Err(e) => return UploadOutcome::HardFailure(UploadFailure::Unreadable(e)),
        };

        let content = match std::fs::read(file) {
            Ok(content) => content,
            Err(e) => {
                return UploadOutcome::HardFailure(UploadFailure::Unreadable(format!(
                    "{}: {}",
                    file.display(),
                    e
                )));
            }
        };

        let filename = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let form = Form::new().part("data", Part::bytes(content).file_name(filename));

        debug!("Posting {file} to {url}", file: file.display().to_string(), url: url.as_str());
        let response = self
            .http_client
            .post(url.clone())
            .bearer_auth(access_token)
            .multipart(form)
            .send();

        let text = match response.and_then(|r| r.text()) {
            Ok(text) => text,
            Err(e) => {
                error!("Request to {url} failed: {err}", url: url.as_str(), err: e.to_string().as_str());
                return UploadOutcome::HardFailure(UploadFailure::Transport(e.to_string()));
            }
        };

        let outcome = classify_response(&text);
        match &outcome {
            UploadOutcome::Success => info!("Successfully archived {file}", file: file.display().to_string()),
            UploadOutcome::SoftFail => info!("Failed to archive {file}", file: file.display().to_string()),
            UploadOutcome::AuthFailure => error!("Authentication refused during archive of {file}", file: file.display().to_string()),
            UploadOutcome::HardFailure(failure) => {
                error!("Archive of {file} failed: {failure}", file: file.display().to_string(), failure: failure.to_string())
            }
        }
        outcome
    }

    // URL construction helpers
    fn holdings_url(&self, deployment_id: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(&format!("holdings/{}", deployment_id))
    }

    fn upload_url(&self, file: &Path, deployment_id: &str, mode: UploadMode) -> Result<Url, String> {
        let mut url = self
            .base_url
            .join(&format!("{}/{}", mode.endpoint(), deployment_id))
            .map_err(|e| format!("invalid upload URL for {}: {}", deployment_id, e))?;

        if mode == UploadMode::Nrt {
            let relative = file
                .file_name()
                .ok_or_else(|| format!("{} has no file name", file.display()))?
                .to_string_lossy()
                .into_owned();
            let parent = file.parent().unwrap_or_else(|| Path::new("."));
            let parent = std::fs::canonicalize(parent)
                .map_err(|e| format!("cannot resolve {}: {}", parent.display(), e))?;
            url.query_pairs_mut()
                .append_pair("relativePath", &relative)
                .append_pair("hostPath", &format!("/{}/", parent.display()));
        }

        Ok(url)
    }
}
