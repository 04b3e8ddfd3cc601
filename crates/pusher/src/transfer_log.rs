use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Append-only record of confirmed uploads for one deployment
#[derive(Debug, Clone)]
pub struct TransferLog {
    path: PathBuf,
}

impl TransferLog {
    /// `deployment-{id}-log.out` in the first existing directory of
    /// `candidates`, falling back to the current directory.
    pub fn for_deployment(candidates: &[&Path], deployment_id: &str) -> Self {
        let dir = crate::first_existing_dir(candidates);
        TransferLog {
            path: dir.join(format!("deployment-{}-log.out", deployment_id)),
        }
    }

    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        TransferLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, file: &Path) -> std::io::Result<()> {
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(out, "{}", format_line(file, &Local::now().format(TIME_FORMAT).to_string()))
    }
}

fn format_line(file: &Path, time: &str) -> String {
    format!("File: {} Uploaded at: {}", file.display(), time)
}
