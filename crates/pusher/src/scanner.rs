use crate::watermark::Watermark;
use diagnostics::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wax::Glob;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid pattern {pattern}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("walking {root} failed: {reason}")]
    Walk { root: String, reason: String },
}

/// A local file that may need archiving
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFile {
    pub path: PathBuf,
    /// Base filename, compared against the archive's holdings
    pub name: String,
    pub modified: Watermark,
}

/// Finds local files by filename suffix
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    suffixes: Vec<String>,
    recursive: bool,
}

impl Scanner {
    pub fn new<P: Into<PathBuf>>(root: P, suffixes: Vec<String>, recursive: bool) -> Self {
        Scanner {
            root: root.into(),
            suffixes,
            recursive,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Regular files matching a suffix, in suffix order then walk order.
    ///
    /// With a floor, only files modified strictly after it are kept.
    pub fn scan(&self, floor: Option<Watermark>) -> Result<Vec<CandidateFile>, ScanError> {
        if !self.root.is_dir() {
            warn!("Data directory {root} does not exist", root: self.root.display().to_string());
            return Ok(Vec::new());
        }

        let prefix = if self.recursive { "**/*" } else { "*" };
        let mut found = Vec::new();

        for suffix in &self.suffixes {
            let pattern = format!("{}{}", prefix, escape(suffix));
            let glob = Glob::new(&pattern).map_err(|e| ScanError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;

            let before = found.len();
            for entry in glob.walk(&self.root) {
                let entry = entry.map_err(|e| ScanError::Walk {
                    root: self.root.display().to_string(),
                    reason: e.to_string(),
                })?;

                let path = entry.path();
                let md = match std::fs::metadata(path) {
                    Ok(md) => md,
                    Err(e) => {
                        // Removed between walk and stat
                        debug!("Skipping {path}: {err}", path: path.display().to_string(), err: e.to_string().as_str());
                        continue;
                    }
                };
                if !md.is_file() {
                    continue;
                }

                let modified = md
                    .modified()
                    .map(Watermark::from_system_time)
                    .unwrap_or(Watermark::from_secs(0.0));
                if floor.is_some_and(|floor| modified <= floor) {
                    continue;
                }

                let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                    continue;
                };
                found.push(CandidateFile {
                    path: path.to_path_buf(),
                    name,
                    modified,
                });
            }

            debug!("{count} candidate files for {suffix}", count: found.len() - before, suffix: suffix.as_str());
        }

        Ok(found)
    }
}

// Suffixes are literal text, not patterns
fn escape(suffix: &str) -> String {
    let mut out = String::with_capacity(suffix.len());
    for c in suffix.chars() {
        if matches!(
            c,
            '\\' | '?' | '*' | '$' | ':' | '<' | '>' | '(' | ')' | '[' | ']' | '{' | '}' | ','
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
