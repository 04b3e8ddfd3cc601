use crate::scanner::{CandidateFile, ScanError, Scanner};
use crate::transfer_log::TransferLog;
use crate::watermark::{MarkerStore, Watermark, WatermarkError, WatermarkStore};
use archive::{
    AccessCodeError, ArchiveClient, HoldingsUnavailable, TokenPair, TokenRefresher, UploadFailure,
    UploadMode, UploadOutcome,
};
use diagnostics::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Upload attempts per file per cycle
pub const MAX_ATTEMPTS: usize = 3;

/// The archive as seen by the engine
pub trait Archive {
    fn existing_files(&self, deployment_id: &str) -> Result<HashSet<String>, HoldingsUnavailable>;

    fn upload(
        &self,
        file: &Path,
        deployment_id: &str,
        access_token: &str,
        mode: UploadMode,
    ) -> UploadOutcome;
}

impl Archive for ArchiveClient {
    fn existing_files(&self, deployment_id: &str) -> Result<HashSet<String>, HoldingsUnavailable> {
        ArchiveClient::existing_files(self, deployment_id)
    }

    fn upload(
        &self,
        file: &Path,
        deployment_id: &str,
        access_token: &str,
        mode: UploadMode,
    ) -> UploadOutcome {
        ArchiveClient::upload(self, file, deployment_id, access_token, mode)
    }
}

pub trait TokenRefresh {
    fn refresh(&self, refresh_token: &str) -> Result<String, AccessCodeError>;
}

impl TokenRefresh for TokenRefresher {
    fn refresh(&self, refresh_token: &str) -> Result<String, AccessCodeError> {
        TokenRefresher::refresh(self, refresh_token)
    }
}

/// Holds the current access token and renews it on demand
pub struct TokenManager<R> {
    refresher: R,
    tokens: TokenPair,
    refreshes: usize,
}

impl<R: TokenRefresh> TokenManager<R> {
    pub fn new(refresher: R, tokens: TokenPair) -> Self {
        TokenManager {
            refresher,
            tokens,
            refreshes: 0,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.tokens.access_token
    }

    pub fn refresh(&mut self) -> Result<(), AccessCodeError> {
        self.refreshes += 1;
        self.tokens.access_token = self.refresher.refresh(&self.tokens.refresh_token)?;
        Ok(())
    }

    /// Successful or not
    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    pub fn refresher(&self) -> &R {
        &self.refresher
    }
}

/// What a cycle does with new files
pub enum Delivery<R> {
    /// Count and log, never upload
    DryRun,
    Upload {
        mode: UploadMode,
        tokens: TokenManager<R>,
    },
}

/// When the watermark advances at the end of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPolicy {
    /// After every completed cycle, whatever happened to individual files
    #[default]
    Always,
    /// Only when every attempted upload in the cycle succeeded. Scans stay
    /// unfloored until the watermark has advanced once.
    Strict,
}

#[derive(Debug, Clone)]
pub struct PushSettings {
    pub deployment_id: String,
    /// Sleep between cycles
    pub interval: Duration,
    pub policy: WatermarkPolicy,
    /// Where `Error_cycle_{n}.txt` artifacts are written
    pub error_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PusherState {
    Idle,
    Running,
    Stopped,
}

/// Counters for one completed cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub held: usize,
    pub local: usize,
    pub duplicates: usize,
    pub uploaded: usize,
    /// Dry run only
    pub would_upload: usize,
    /// Gave up after exhausting every attempt
    pub exhausted: usize,
    /// Gave up early on a failure retrying cannot fix
    pub abandoned: usize,
    /// Stored watermark, if it advanced
    pub watermark: Option<Watermark>,
}

impl CycleReport {
    fn all_delivered(&self) -> bool {
        self.exhausted == 0 && self.abandoned == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleStatus {
    /// The deployment marker is gone
    Stopped,
    /// Holdings could not be fetched; nothing was uploaded
    Skipped,
    Completed(CycleReport),
}

/// Faults that end a cycle early
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("watermark failure: {0}")]
    Watermark(#[from] WatermarkError),

    #[error("scan failure: {0}")]
    Scan(#[from] ScanError),

    #[error("token refresh failure: {0}")]
    Refresh(#[from] AccessCodeError),
}

enum FileResult {
    Delivered,
    Abandoned(UploadFailure),
    Exhausted,
}

/// The push cycle engine for one deployment
pub struct Pusher<A, R, S> {
    archive: A,
    delivery: Delivery<R>,
    watermarks: WatermarkStore<S>,
    scanner: Scanner,
    transfer_log: TransferLog,
    settings: PushSettings,
    state: PusherState,
    /// Set once this engine has advanced the watermark; read by the strict policy
    floor_active: bool,
}

impl<A, R, S> Pusher<A, R, S>
where
    A: Archive,
    R: TokenRefresh,
    S: MarkerStore,
{
    pub fn new(
        archive: A,
        delivery: Delivery<R>,
        watermarks: WatermarkStore<S>,
        scanner: Scanner,
        transfer_log: TransferLog,
        settings: PushSettings,
    ) -> Self {
        Pusher {
            archive,
            delivery,
            watermarks,
            scanner,
            transfer_log,
            settings,
            state: PusherState::Idle,
            floor_active: false,
        }
    }

    pub fn state(&self) -> PusherState {
        self.state
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn watermarks(&self) -> &WatermarkStore<S> {
        &self.watermarks
    }

    pub fn tokens(&self) -> Option<&TokenManager<R>> {
        match &self.delivery {
            Delivery::DryRun => None,
            Delivery::Upload { tokens, .. } => Some(tokens),
        }
    }

    /// Cycle until the deployment marker disappears.
    pub fn run(&mut self) -> PusherState {
        info!(
            "Program will wait {interval}s between checking for new files",
            interval: self.settings.interval.as_secs()
        );

        let mut cycle: u64 = 1;
        loop {
            info!("Starting cycle number: {cycle}", cycle);
            match self.run_cycle(cycle) {
                Ok(CycleStatus::Stopped) => break,
                Ok(CycleStatus::Skipped) => {
                    info!("Cycle number {cycle} skipped", cycle);
                }
                Ok(CycleStatus::Completed(_)) => {
                    info!("Cycle number {cycle} complete.", cycle);
                }
                Err(e) => {
                    error!("Exception caught during cycle {cycle}: {err}", cycle, err: e.to_string().as_str());
                    self.write_error_artifact(cycle, &e);
                    cycle += 1;
                    continue;
                }
            }

            debug!("Sleeping {secs}s", secs: self.settings.interval.as_secs());
            std::thread::sleep(self.settings.interval);
            cycle += 1;
        }

        info!(
            "Deployment {id} has been stopped, program exiting.",
            id: self.settings.deployment_id.as_str()
        );
        self.state
    }

    /// Run one cycle. Faults are returned, not logged.
    pub fn run_cycle(&mut self, cycle: u64) -> Result<CycleStatus, CycleError> {
        let id = self.settings.deployment_id.as_str();

        let Some(mark) = self.watermarks.read(id)? else {
            self.state = PusherState::Stopped;
            return Ok(CycleStatus::Stopped);
        };
        self.state = PusherState::Running;

        let held = match self.archive.existing_files(id) {
            Ok(held) => held,
            Err(e) => {
                error!(
                    "Unable to get existing files. A file send will not be attempted to avoid sending duplicated files: {err}",
                    err: e.to_string().as_str()
                );
                return Ok(CycleStatus::Skipped);
            }
        };

        let floor = match self.settings.policy {
            WatermarkPolicy::Always => (cycle > 1).then_some(mark),
            // Full scan until a cycle has advanced the watermark
            WatermarkPolicy::Strict => self.floor_active.then_some(mark),
        };
        let files = self.scanner.scan(floor)?;

        let mut report = CycleReport {
            cycle,
            held: held.len(),
            local: files.len(),
            ..CycleReport::default()
        };
        info!("There are {local} files locally", local: report.local);
        info!(
            "There are currently {held} files in the archive for deployment {id}",
            held: report.held,
            id
        );

        let mut stop_requested = false;
        for file in &files {
            if held.contains(&file.name) {
                warn!("{file} already exists in deployment", file: file.path.display().to_string());
                report.duplicates += 1;
                continue;
            }

            match &mut self.delivery {
                Delivery::DryRun => {
                    info!(
                        "{file} will be sent to the archive in non dry-run mode",
                        file: file.path.display().to_string()
                    );
                    report.would_upload += 1;
                }
                Delivery::Upload { mode, tokens } => {
                    let mode = *mode;
                    match deliver(&self.archive, tokens, file, id, mode)? {
                        FileResult::Delivered => {
                            report.uploaded += 1;
                            if let Err(e) = self.transfer_log.record(&file.path) {
                                warn!(
                                    "Could not record {file} in {log}: {err}",
                                    file: file.path.display().to_string(),
                                    log: self.transfer_log.path().display().to_string(),
                                    err: e.to_string().as_str()
                                );
                            }
                            if mode == UploadMode::Recovery && !stop_requested {
                                stop_requested = true;
                                if let Err(e) = self.watermarks.stop(id) {
                                    warn!("Could not stop deployment {id} after recovery upload: {err}", id, err: e.to_string().as_str());
                                }
                            }
                        }
                        FileResult::Abandoned(failure) => {
                            error!(
                                "Abandoning {file} for this cycle: {failure}",
                                file: file.path.display().to_string(),
                                failure: failure.to_string()
                            );
                            report.abandoned += 1;
                        }
                        FileResult::Exhausted => {
                            error!(
                                "Giving up on {file} after {attempts} attempts",
                                file: file.path.display().to_string(),
                                attempts: MAX_ATTEMPTS
                            );
                            report.exhausted += 1;
                        }
                    }
                }
            }
        }

        let advance = match self.settings.policy {
            WatermarkPolicy::Always => true,
            WatermarkPolicy::Strict => report.all_delivered(),
        };
        if advance {
            report.watermark = self.watermarks.update(id, Watermark::now())?;
            match report.watermark {
                Some(_) => info!("Time updated for the next push."),
                None => info!("Deployment {id} was stopped during the cycle", id),
            }
        } else {
            warn!(
                "Watermark held back: {failed} files were not delivered",
                failed: report.exhausted + report.abandoned
            );
        }
        self.floor_active |= report.watermark.is_some();

        if matches!(self.delivery, Delivery::DryRun) {
            info!(
                "A total of {count} files would have been sent to the archive in non dry-run mode",
                count: report.would_upload
            );
        } else {
            info!(
                "There are {total} files in archive after {count} new files",
                total: report.held + report.uploaded,
                count: report.uploaded
            );
        }
        info!("A total of {duplicates} duplicates were detected", duplicates: report.duplicates);

        Ok(CycleStatus::Completed(report))
    }

    fn write_error_artifact(&self, cycle: u64, err: &CycleError) {
        let path = self.settings.error_dir.join(format!("Error_cycle_{}.txt", cycle));
        if let Err(e) = std::fs::write(&path, error_chain(err)) {
            warn!(
                "Could not write {path}: {err}",
                path: path.display().to_string(),
                err: e.to_string().as_str()
            );
        }
    }
}

/// Up to `MAX_ATTEMPTS` uploads of one file, refreshing the token when
/// the archive refuses it.
fn deliver<A: Archive, R: TokenRefresh>(
    archive: &A,
    tokens: &mut TokenManager<R>,
    file: &CandidateFile,
    deployment_id: &str,
    mode: UploadMode,
) -> Result<FileResult, AccessCodeError> {
    info!("Starting file transfer of {file}", file: file.path.display().to_string());

    for attempt in 1..=MAX_ATTEMPTS {
        match archive.upload(&file.path, deployment_id, tokens.access_token(), mode) {
            UploadOutcome::Success => {
                info!("File transfer complete for: {file}", file: file.path.display().to_string());
                return Ok(FileResult::Delivered);
            }
            UploadOutcome::AuthFailure => {
                warn!("Auth failed, attempting to reset token");
                tokens.refresh()?;
            }
            UploadOutcome::HardFailure(failure) if failure.is_terminal() => {
                return Ok(FileResult::Abandoned(failure));
            }
            UploadOutcome::HardFailure(failure) => {
                error!(
                    "File transfer failed for {file} on attempt {attempt}: {failure}",
                    file: file.path.display().to_string(),
                    attempt,
                    failure: failure.to_string()
                );
            }
            UploadOutcome::SoftFail => {
                debug!("Attempt {attempt} for {file} was not confirmed", attempt, file: file.path.display().to_string());
            }
        }
    }

    Ok(FileResult::Exhausted)
}

/// Display an error followed by each of its causes
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str("\nCaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain() {
        let err = CycleError::Watermark(WatermarkError::Io(std::io::Error::other("disk full")));
        let text = error_chain(&err);
        assert!(text.starts_with("watermark failure: marker store I/O failed: disk full"));
        assert!(text.contains("Caused by: marker store I/O failed: disk full"));
        assert!(text.contains("Caused by: disk full"));
    }

    #[test]
    fn test_strict_needs_every_file() {
        let mut report = CycleReport::default();
        assert!(report.all_delivered());
        report.abandoned = 1;
        assert!(!report.all_delivered());
    }
}
