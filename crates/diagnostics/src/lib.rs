//! Diagnostics for the APDS pusher
//!
//! Provides structured logging shared by every crate in the workspace.
//! Events go to the console and, once a deployment is known, to a durable
//! log file for that deployment.
//!
//! Usage:
//! - Call `diagnostics::init(LogOptions { .. })` once at startup
//! - Set APDS_LOG=off|error|warn|info|debug to override the level
//! - Call `diagnostics::flush()` before the process exits

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

// Re-export emit so macros can use it
pub use emit;

type FlushFn = Box<dyn Fn(Duration) -> bool + Send + Sync>;

static FLUSH: OnceLock<FlushFn> = OnceLock::new();

/// Minimum severity of events that reach the sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    /// Parse an APDS_LOG value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Level> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Level::Off),
            "error" => Some(Level::Error),
            "warn" => Some(Level::Warn),
            "info" => Some(Level::Info),
            "debug" | "trace" => Some(Level::Debug),
            _ => None,
        }
    }

    fn to_emit(self) -> Option<emit::Level> {
        match self {
            Level::Off => None,
            Level::Error => Some(emit::Level::Error),
            Level::Warn => Some(emit::Level::Warn),
            Level::Info => Some(emit::Level::Info),
            Level::Debug => Some(emit::Level::Debug),
        }
    }
}

/// Sink configuration for `init`.
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: Level,
    /// Durable log file. Rolled daily by the file sink.
    pub log_file: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: Level::Info,
            log_file: None,
        }
    }
}

impl LogOptions {
    /// Console-only logging at the given level.
    pub fn console(level: Level) -> Self {
        Self {
            level,
            log_file: None,
        }
    }

    /// The level actually used, after applying the APDS_LOG override.
    pub fn effective_level(&self) -> Level {
        match std::env::var("APDS_LOG") {
            Ok(value) => Level::parse(&value).unwrap_or_else(|| {
                // Bootstrap warning, no sink is installed yet.
                eprintln!("Warning: Unknown APDS_LOG value '{}', using '{:?}'", value, self.level);
                self.level
            }),
            Err(_) => self.level,
        }
    }
}

/// Initialize diagnostics.
///
/// Only the first call installs sinks; subsequent calls are ignored, so
/// tests may call this freely.
pub fn init(options: LogOptions) {
    let _ = FLUSH.get_or_init(|| -> FlushFn {
        let Some(min) = options.effective_level().to_emit() else {
            return Box::new(|_| true);
        };

        match options.log_file {
            Some(path) => {
                let rt = emit::setup()
                    .emit_to(emit_term::stderr())
                    .and_emit_to(emit_file::set(path).roll_by_day().spawn())
                    .emit_when(emit::level::min_filter(min))
                    .init();
                Box::new(move |timeout| rt.blocking_flush(timeout))
            }
            None => {
                let rt = emit::setup()
                    .emit_to(emit_term::stderr())
                    .emit_when(emit::level::min_filter(min))
                    .init();
                Box::new(move |timeout| rt.blocking_flush(timeout))
            }
        }
    });
}

/// Flush buffered events, waiting at most five seconds.
pub fn flush() -> bool {
    match FLUSH.get() {
        Some(flush) => flush(Duration::from_secs(5)),
        None => true,
    }
}

/// Log basic operations (cycles started, files sent, tokens refreshed)
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log detailed diagnostics (per-attempt detail, scan contents, URLs)
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log recoverable conditions (duplicates, auth retries, fallbacks)
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures (transfers failed, holdings unavailable, cycle faults)
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_safe_to_call_multiple_times() {
        init(LogOptions::console(Level::Off));
        init(LogOptions::console(Level::Debug));
        init(LogOptions::default());
        assert!(flush());
    }

    #[test]
    fn test_macros_compile() {
        let cycle = 3;
        info!("Starting cycle number: {cycle}", cycle);
        debug!("Attempt {attempt}", attempt: 2);
        warn!("Warning message");
        error!("Error message");
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse(" warn "), Some(Level::Warn));
        assert_eq!(Level::parse("off"), Some(Level::Off));
        assert_eq!(Level::parse("verbose"), None);
    }
}
