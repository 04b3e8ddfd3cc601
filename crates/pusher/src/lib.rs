pub mod config;
pub mod engine;
pub mod scanner;
pub mod transfer_log;
pub mod watermark;

pub use config::{ConfigError, Configuration};
pub use engine::{
    Archive, CycleError, CycleReport, CycleStatus, Delivery, MAX_ATTEMPTS, PushSettings, Pusher,
    PusherState, TokenManager, TokenRefresh, WatermarkPolicy,
};
pub use scanner::{CandidateFile, ScanError, Scanner};
pub use transfer_log::TransferLog;
pub use watermark::{
    FileMarkerStore, MarkerStore, MemoryMarkerStore, Watermark, WatermarkError, WatermarkStore,
};

use std::path::{Path, PathBuf};

/// The first of `candidates` that is an existing directory, else the
/// current working directory.
pub fn first_existing_dir(candidates: &[&Path]) -> PathBuf {
    candidates
        .iter()
        .find(|dir| dir.is_dir())
        .map(|dir| dir.to_path_buf())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
