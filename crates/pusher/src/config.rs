use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Every field the configuration file must carry, in file order
pub const FIELDS: [&str; 10] = [
    "auth0_tenant",
    "auth2_audience",
    "client_id",
    "client_secret",
    "bodc_archive_url",
    "file_formats",
    "archive_checker_frequency",
    "save_file_location",
    "log_file_location",
    "deployment_location",
];

const PATH_FIELDS: [&str; 3] = ["save_file_location", "log_file_location", "deployment_location"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not a JSON object: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Unexpected fields given: {}", .0.join(", "))]
    ExtraFields(Vec<String>),

    #[error("Missing expected fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Blank values found for fields: {}", .0.join(", "))]
    BlankValues(Vec<String>),

    #[error("{field} is invalid: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Validated pusher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub auth0_tenant: String,
    pub auth2_audience: String,
    pub client_id: String,
    pub client_secret: String,
    pub bodc_archive_url: String,
    /// Filename suffixes to push, in scan order
    pub file_formats: Vec<String>,
    /// Minutes between push cycles
    pub archive_checker_frequency: u64,
    pub save_file_location: PathBuf,
    pub log_file_location: PathBuf,
    /// Directory holding one watermark marker per running deployment
    pub deployment_location: PathBuf,
}

impl Configuration {
    /// Load and validate a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;

        let value: Value = serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(ConfigError::Malformed {
                path: path.display().to_string(),
                reason: format!("expected an object, found {}", type_name(&other)),
            }),
        }
    }

    /// Validate an already-parsed configuration object.
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self, ConfigError> {
        let extra: Vec<String> = map
            .keys()
            .filter(|key| !FIELDS.contains(&key.as_str()))
            .cloned()
            .collect();
        if !extra.is_empty() {
            return Err(ConfigError::ExtraFields(extra));
        }

        let missing: Vec<String> = FIELDS
            .iter()
            .filter(|field| !map.contains_key(**field))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        let blank: Vec<String> = FIELDS
            .iter()
            .filter(|field| map.get(**field).is_some_and(is_blank))
            .map(|field| field.to_string())
            .collect();
        if !blank.is_empty() {
            return Err(ConfigError::BlankValues(blank));
        }

        for field in FIELDS {
            check_field_type(field, &map[field])?;
        }

        for field in PATH_FIELDS {
            if let Some(Value::String(raw)) = map.get(field) {
                let expanded = expand_home(raw).display().to_string();
                map.insert(field.to_string(), Value::String(expanded));
            }
        }

        serde_json::from_value(Value::Object(map)).map_err(|e| ConfigError::Malformed {
            path: "<config>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Pause between the end of one cycle and the start of the next
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.archive_checker_frequency.saturating_mul(60))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn check_field_type(field: &str, value: &Value) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidField {
        field: field.to_string(),
        reason,
    };

    match field {
        "file_formats" => {
            let items = value
                .as_array()
                .ok_or_else(|| invalid(format!("expected a list of suffixes, found {}", type_name(value))))?;
            for item in items {
                match item.as_str() {
                    Some(suffix) if !suffix.trim().is_empty() => {}
                    _ => return Err(invalid(format!("suffix {} is not a non-empty string", item))),
                }
            }
            Ok(())
        }
        "archive_checker_frequency" => match value.as_u64() {
            Some(minutes) if minutes > 0 => Ok(()),
            Some(_) => Err(invalid("must be a positive number of minutes".to_string())),
            None => Err(invalid(format!("expected a positive integer, found {}", value))),
        },
        _ => match value {
            Value::String(_) => Ok(()),
            other => Err(invalid(format!("expected a string, found {}", type_name(other)))),
        },
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/")
    };

    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Map<String, Value> {
        let value = json!({
            "auth0_tenant": "bodc.eu.auth0.com",
            "auth2_audience": "https://archive.example.org",
            "client_id": "client-1",
            "client_secret": "secret-1",
            "bodc_archive_url": "https://archive.example.org/apds",
            "file_formats": [".cac", ".sbd"],
            "archive_checker_frequency": 5,
            "save_file_location": "/tmp/save",
            "log_file_location": "/tmp/log",
            "deployment_location": "/tmp/deployments"
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_valid_configuration() {
        let config = Configuration::from_map(valid()).expect("valid config");
        assert_eq!(config.file_formats, vec![".cac", ".sbd"]);
        assert_eq!(config.interval(), Duration::from_secs(300));
        assert_eq!(config.deployment_location, PathBuf::from("/tmp/deployments"));
    }

    #[test]
    fn test_extra_fields() {
        let mut map = valid();
        map.insert("colour".to_string(), json!("blue"));
        match Configuration::from_map(map) {
            Err(ConfigError::ExtraFields(fields)) => assert_eq!(fields, vec!["colour"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_fields() {
        let mut map = valid();
        map.remove("client_secret");
        map.remove("file_formats");
        match Configuration::from_map(map) {
            Err(ConfigError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["client_secret", "file_formats"])
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_blank_values() {
        let mut map = valid();
        map.insert("client_id".to_string(), json!(""));
        map.insert("file_formats".to_string(), json!([]));
        match Configuration::from_map(map) {
            Err(ConfigError::BlankValues(fields)) => {
                assert_eq!(fields, vec!["client_id", "file_formats"])
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_frequency() {
        for bad in [json!(0), json!(-3), json!("5"), json!(2.5)] {
            let mut map = valid();
            map.insert("archive_checker_frequency".to_string(), bad.clone());
            match Configuration::from_map(map) {
                Err(ConfigError::InvalidField { field, .. }) => {
                    assert_eq!(field, "archive_checker_frequency", "value {}", bad)
                }
                other => panic!("unexpected for {}: {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_invalid_string_field() {
        let mut map = valid();
        map.insert("bodc_archive_url".to_string(), json!(42));
        assert!(matches!(
            Configuration::from_map(map),
            Err(ConfigError::InvalidField { ref field, .. }) if field == "bodc_archive_url"
        ));
    }

    #[test]
    fn test_home_expansion() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/glider"), home.join("glider"));
            assert_eq!(expand_home("~"), home);
        }
        assert_eq!(expand_home("/abs/~/x"), PathBuf::from("/abs/~/x"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, Value::Object(valid()).to_string()).expect("write");
        let config = Configuration::load(&path).expect("load");
        assert_eq!(config.auth0_tenant, "bodc.eu.auth0.com");

        std::fs::write(&path, "[1, 2]").expect("write");
        assert!(matches!(
            Configuration::load(&path),
            Err(ConfigError::Malformed { .. })
        ));

        assert!(matches!(
            Configuration::load(dir.path().join("absent.json")),
            Err(ConfigError::Unreadable { .. })
        ));
    }
}
