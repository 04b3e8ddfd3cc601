use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Category keys holding file listings end with this suffix.
pub const FILE_CATEGORY_SUFFIX: &str = "files";

/// Categories containing this substring are never treated as file listings.
pub const EXCLUDED_CATEGORY: &str = "rxf";

/// Response body of the holdings endpoint
#[derive(Serialize, Deserialize, Debug)]
pub struct HoldingsResponse {
    pub files: serde_json::Map<String, serde_json::Value>,
}

/// One file the archive already holds
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeldFile {
    pub name: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl HoldingsResponse {
    /// Union the `name` of every entry across all file-listing categories.
    pub fn filenames(&self) -> Result<HashSet<String>, serde_json::Error> {
        let mut names = HashSet::new();
        for (category, listing) in &self.files {
            if !is_file_category(category) {
                continue;
            }
            let entries: Vec<HeldFile> = serde_json::from_value(listing.clone())?;
            names.extend(entries.into_iter().map(|entry| entry.name));
        }
        Ok(names)
    }
}

fn is_file_category(category: &str) -> bool {
    category.ends_with(FILE_CATEGORY_SUFFIX) && !category.contains(EXCLUDED_CATEGORY)
}

/// Which archive endpoint receives the upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Continuous near-real-time archival
    Nrt,
    /// One-shot post-mission recovery upload
    Recovery,
}

impl UploadMode {
    pub fn endpoint(self) -> &'static str {
        match self {
            UploadMode::Nrt => "archiveFile",
            UploadMode::Recovery => "archiveRecovery",
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::Nrt => write!(f, "NRT"),
            UploadMode::Recovery => write!(f, "Recovery"),
        }
    }
}

/// Result of exactly one upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success,
    /// The archive answered without any known marker
    SoftFail,
    /// The access token was refused
    AuthFailure,
    HardFailure(UploadFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFailure {
    /// Archive reported an internal server error
    ServerFault,
    /// Archive reported the deployment or endpoint as not found
    NotFoundRemote,
    /// Request never completed (connect, timeout, body read)
    Transport(String),
    /// The local file could not be read
    Unreadable(String),
}

impl UploadFailure {
    /// Retrying cannot change the answer for this file in this cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadFailure::NotFoundRemote | UploadFailure::Unreadable(_))
    }
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadFailure::ServerFault => write!(f, "archive reported 500 Internal Server Error"),
            UploadFailure::NotFoundRemote => write!(f, "archive reported 404 Not Found"),
            UploadFailure::Transport(msg) => write!(f, "transport error: {}", msg),
            UploadFailure::Unreadable(msg) => write!(f, "local file unreadable: {}", msg),
        }
    }
}

// Response markers, checked in this order
const MARKER_SERVER_FAULT: &str = "500 Internal Server Error";
const MARKER_UNAUTHORIZED: &str = "401 Unauthorized";
const MARKER_NOT_FOUND: &str = "404 Not Found";
const MARKER_SUCCESS: &str = "File Archive Successful";

/// Classify an upload response by the markers in its body.
pub fn classify_response(body: &str) -> UploadOutcome {
    if body.contains(MARKER_SERVER_FAULT) {
        UploadOutcome::HardFailure(UploadFailure::ServerFault)
    } else if body.contains(MARKER_UNAUTHORIZED) {
        UploadOutcome::AuthFailure
    } else if body.contains(MARKER_NOT_FOUND) {
        UploadOutcome::HardFailure(UploadFailure::NotFoundRemote)
    } else if body.contains(MARKER_SUCCESS) {
        UploadOutcome::Success
    } else {
        UploadOutcome::SoftFail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filenames_union_across_categories() {
        let body = serde_json::json!({
            "files": {
                ".cac_Count": 2,
                ".cac_files": [
                    {"name": "4fca660c.cac", "checksum": "d3e7", "date": "2019-02-21T08:03:55"},
                    {"name": "ad21ffc1.cac", "checksum": "8876", "date": "2019-02-21T08:04:03"}
                ],
                ".sbd_files": [
                    {"name": "unit_398-2019-051-0-0.sbd"},
                    {"name": "ad21ffc1.cac"}
                ],
                ".rxf_files": [
                    {"name": "excluded.rxf"}
                ]
            }
        });
        let holdings: HoldingsResponse = serde_json::from_value(body).expect("valid holdings");
        let names = holdings.filenames().expect("parse names");

        assert_eq!(names.len(), 3);
        assert!(names.contains("4fca660c.cac"));
        assert!(names.contains("ad21ffc1.cac"));
        assert!(names.contains("unit_398-2019-051-0-0.sbd"));
        assert!(!names.contains("excluded.rxf"));
    }

    #[test]
    fn test_filenames_rejects_malformed_listing() {
        let body = serde_json::json!({"files": {".cac_files": [{"checksum": "no name"}]}});
        let holdings: HoldingsResponse = serde_json::from_value(body).expect("valid envelope");
        assert!(holdings.filenames().is_err());
    }

    #[test]
    fn test_classify_response_markers() {
        assert_eq!(classify_response("File Archive Successful"), UploadOutcome::Success);
        assert_eq!(classify_response("<h1>401 Unauthorized</h1>"), UploadOutcome::AuthFailure);
        assert_eq!(
            classify_response("500 Internal Server Error"),
            UploadOutcome::HardFailure(UploadFailure::ServerFault)
        );
        assert_eq!(
            classify_response("404 Not Found"),
            UploadOutcome::HardFailure(UploadFailure::NotFoundRemote)
        );
        assert_eq!(classify_response("busy, try later"), UploadOutcome::SoftFail);
    }

    #[test]
    fn test_server_fault_marker_wins() {
        // A fault page that also echoes an earlier success must not count.
        let body = "File Archive Successful ... 500 Internal Server Error";
        assert_eq!(
            classify_response(body),
            UploadOutcome::HardFailure(UploadFailure::ServerFault)
        );
    }

    #[test]
    fn test_terminal_failures() {
        assert!(UploadFailure::NotFoundRemote.is_terminal());
        assert!(UploadFailure::Unreadable("gone".into()).is_terminal());
        assert!(!UploadFailure::ServerFault.is_terminal());
        assert!(!UploadFailure::Transport("timeout".into()).is_terminal());
    }
}
