use anyhow::Result;
use archive::{ArchiveClient, HoldingsUnavailable, UploadFailure, UploadMode, UploadOutcome};
use mockito::{Matcher, Server};
use std::path::PathBuf;

fn holdings_body() -> String {
    serde_json::json!({
        "files": {
            ".cac_Count": 1,
            ".cac_files": [
                {"name": "4fca660c.cac", "checksum": "d3e7", "date": "2019-02-21T08:03:55"}
            ],
            ".sbd_files": [
                {"name": "unit_398-2019-051-0-0.sbd", "checksum": "aa01", "date": "2019-02-20T22:10:40"}
            ],
            ".rxf_files": [
                {"name": "never.rxf"}
            ]
        }
    })
    .to_string()
}

fn glider_file(dir: &tempfile::TempDir, name: &str) -> Result<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, b"glider telemetry")?;
    Ok(path)
}

/// Holdings are the union of every file category
#[test]
fn test_existing_files() -> Result<()> {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/holdings/441")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(holdings_body())
        .create();

    let client = ArchiveClient::new(&server.url())?;
    let names = client.existing_files("441")?;

    mock.assert();
    assert_eq!(names.len(), 2);
    assert!(names.contains("4fca660c.cac"));
    assert!(names.contains("unit_398-2019-051-0-0.sbd"));
    Ok(())
}

/// A base URL with a path prefix keeps that prefix
#[test]
fn test_existing_files_under_path_prefix() -> Result<()> {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/apds/holdings/441")
        .with_status(200)
        .with_body(holdings_body())
        .create();

    let client = ArchiveClient::new(&format!("{}/apds", server.url()))?;
    client.existing_files("441")?;

    mock.assert();
    Ok(())
}

#[test]
fn test_existing_files_http_error() -> Result<()> {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/holdings/441")
        .with_status(404)
        .with_body("404 Not Found")
        .create();

    let client = ArchiveClient::new(&server.url())?;
    let err = client.existing_files("441").expect_err("404 must not look like an empty archive");
    assert!(matches!(err, HoldingsUnavailable::Status { status: 404, .. }));
    Ok(())
}

#[test]
fn test_existing_files_malformed_body() -> Result<()> {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/holdings/441")
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create();

    let client = ArchiveClient::new(&server.url())?;
    let err = client.existing_files("441").expect_err("HTML is not a holdings document");
    assert!(matches!(err, HoldingsUnavailable::Malformed { .. }));
    Ok(())
}

#[test]
fn test_existing_files_unreachable() -> Result<()> {
    // Nothing listens on the discard port
    let client = ArchiveClient::new("http://127.0.0.1:9/")?;
    let err = client.existing_files("441").expect_err("connection refused");
    assert!(matches!(err, HoldingsUnavailable::Request { .. }));
    Ok(())
}

/// An NRT upload carries the bearer token and a multipart `data` part
#[test]
fn test_upload_nrt_success() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = glider_file(&dir, "4fca660c.cac")?;

    let mut server = Server::new();
    let mock = server
        .mock("POST", "/archiveFile/441")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("relativePath".into(), "4fca660c.cac".into()),
            Matcher::Regex("hostPath=".into()),
        ]))
        .match_header("authorization", "Bearer token-1")
        .match_header("content-type", Matcher::Regex("multipart/form-data".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="data""#.into()),
            Matcher::Regex(r#"filename="4fca660c.cac""#.into()),
            Matcher::Regex("glider telemetry".into()),
        ]))
        .with_status(200)
        .with_body("File Archive Successful")
        .create();

    let client = ArchiveClient::new(&server.url())?;
    let outcome = client.upload(&file, "441", "token-1", UploadMode::Nrt);

    mock.assert();
    assert_eq!(outcome, UploadOutcome::Success);
    Ok(())
}

#[test]
fn test_upload_recovery_endpoint() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = glider_file(&dir, "ad21ffc1.cac")?;

    let mut server = Server::new();
    let mock = server
        .mock("POST", "/archiveRecovery/441")
        .with_status(200)
        .with_body("File Archive Successful")
        .create();

    let client = ArchiveClient::new(&server.url())?;
    let outcome = client.upload(&file, "441", "token-1", UploadMode::Recovery);

    mock.assert();
    assert_eq!(outcome, UploadOutcome::Success);
    Ok(())
}

/// The archive answers 200 with an error page; the marker decides
#[test]
fn test_upload_classifies_body_markers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = glider_file(&dir, "4fca660c.cac")?;

    let cases = [
        ("<h1>401 Unauthorized</h1>", UploadOutcome::AuthFailure),
        (
            "<h1>500 Internal Server Error</h1>",
            UploadOutcome::HardFailure(UploadFailure::ServerFault),
        ),
        (
            "<h1>404 Not Found</h1>",
            UploadOutcome::HardFailure(UploadFailure::NotFoundRemote),
        ),
        ("queue full", UploadOutcome::SoftFail),
    ];

    for (body, expected) in cases {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/archiveRecovery/441")
            .with_status(200)
            .with_body(body)
            .create();

        let client = ArchiveClient::new(&server.url())?;
        assert_eq!(
            client.upload(&file, "441", "token-1", UploadMode::Recovery),
            expected,
            "body {:?}",
            body
        );
    }
    Ok(())
}

#[test]
fn test_upload_missing_local_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let client = ArchiveClient::new("http://127.0.0.1:9/")?;

    let outcome = client.upload(&dir.path().join("gone.cac"), "441", "t", UploadMode::Recovery);
    assert!(matches!(
        outcome,
        UploadOutcome::HardFailure(UploadFailure::Unreadable(_))
    ));
    Ok(())
}

#[test]
fn test_upload_transport_failure() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = glider_file(&dir, "4fca660c.cac")?;
    let client = ArchiveClient::new("http://127.0.0.1:9/")?;

    let outcome = client.upload(&file, "441", "t", UploadMode::Recovery);
    assert!(matches!(
        outcome,
        UploadOutcome::HardFailure(UploadFailure::Transport(_))
    ));
    Ok(())
}
