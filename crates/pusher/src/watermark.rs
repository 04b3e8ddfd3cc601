use diagnostics::*;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("deployment id must not be empty")]
    EmptyId,

    #[error("archival is already running for deployment {0}")]
    AlreadyRunning(String),

    #[error("archival is not running for deployment {0}")]
    NotRunning(String),

    #[error("no deployments are running")]
    NoDeployments,

    #[error("marker for deployment {id} holds {content:?}, not a timestamp")]
    Corrupt { id: String, content: String },

    #[error("marker store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Unix time in fractional seconds
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Watermark(f64);

impl Watermark {
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_secs(secs: f64) -> Self {
        Watermark(secs)
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Watermark(since.as_secs_f64()),
            Err(before) => Watermark(-before.duration().as_secs_f64()),
        }
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// The later of two watermarks
    pub fn max(self, other: Watermark) -> Watermark {
        if other.0 > self.0 { other } else { self }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

impl FromStr for Watermark {
    type Err = std::num::ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<f64>().map(Watermark)
    }
}

/// Keyed storage for deployment markers.
///
/// A marker's presence is shared state between the running engine and
/// `stop` invocations in other processes, so creation and replacement
/// are distinct operations: `replace` must never bring back a marker that
/// was deleted.
pub trait MarkerStore {
    fn get(&self, key: &str) -> std::io::Result<Option<String>>;

    /// Create a new marker. Returns false if one already exists.
    fn insert(&self, key: &str, value: &str) -> std::io::Result<bool>;

    /// Overwrite an existing marker. Returns false if it is absent.
    fn replace(&self, key: &str, value: &str) -> std::io::Result<bool>;

    /// Returns false if the marker was absent.
    fn delete(&self, key: &str) -> std::io::Result<bool>;

    fn is_empty(&self) -> std::io::Result<bool>;
}

impl<T: MarkerStore + ?Sized> MarkerStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        (**self).get(key)
    }

    fn insert(&self, key: &str, value: &str) -> std::io::Result<bool> {
        (**self).insert(key, value)
    }

    fn replace(&self, key: &str, value: &str) -> std::io::Result<bool> {
        (**self).replace(key, value)
    }

    fn delete(&self, key: &str) -> std::io::Result<bool> {
        (**self).delete(key)
    }

    fn is_empty(&self) -> std::io::Result<bool> {
        (**self).is_empty()
    }
}

/// Markers as `{dir}/{key}.txt` files
#[derive(Debug, Clone)]
pub struct FileMarkerStore {
    dir: PathBuf,
}

impl FileMarkerStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        FileMarkerStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn marker_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", key))
    }
}

impl MarkerStore for FileMarkerStore {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(self.marker_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn insert(&self, key: &str, value: &str) -> std::io::Result<bool> {
        std::fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.marker_path(key));
        match file {
            Ok(mut file) => {
                file.write_all(value.as_bytes())?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn replace(&self, key: &str, value: &str) -> std::io::Result<bool> {
        // No `create`: a marker deleted by `stop` stays deleted.
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.marker_path(key));
        match file {
            Ok(mut file) => {
                file.write_all(value.as_bytes())?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn delete(&self, key: &str) -> std::io::Result<bool> {
        match std::fs::remove_file(self.marker_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_empty(&self) -> std::io::Result<bool> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// In-process markers, for tests and dry experiments
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    markers: Mutex<BTreeMap<String, String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_markers<R>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> R) -> std::io::Result<R> {
        let mut markers = self
            .markers
            .lock()
            .map_err(|_| std::io::Error::other("marker store lock poisoned"))?;
        Ok(f(&mut markers))
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        self.with_markers(|m| m.get(key).cloned())
    }

    fn insert(&self, key: &str, value: &str) -> std::io::Result<bool> {
        self.with_markers(|m| {
            if m.contains_key(key) {
                false
            } else {
                m.insert(key.to_string(), value.to_string());
                true
            }
        })
    }

    fn replace(&self, key: &str, value: &str) -> std::io::Result<bool> {
        self.with_markers(|m| match m.get_mut(key) {
            Some(existing) => {
                *existing = value.to_string();
                true
            }
            None => false,
        })
    }

    fn delete(&self, key: &str) -> std::io::Result<bool> {
        self.with_markers(|m| m.remove(key).is_some())
    }

    fn is_empty(&self) -> std::io::Result<bool> {
        self.with_markers(|m| m.is_empty())
    }
}

/// Lifecycle of deployment markers: start, stop, read, update
#[derive(Debug)]
pub struct WatermarkStore<S> {
    store: S,
}

impl<S: MarkerStore> WatermarkStore<S> {
    pub fn new(store: S) -> Self {
        WatermarkStore { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Begin archival for a deployment, stamped with the current time.
    pub fn start(&self, id: &str) -> Result<Watermark, WatermarkError> {
        check_id(id)?;
        let now = Watermark::now();
        if !self.store.insert(id, &now.to_string())? {
            return Err(WatermarkError::AlreadyRunning(id.to_string()));
        }
        info!("Archival started for deployment {id} at {watermark}", id: id, watermark: now.to_string());
        Ok(now)
    }

    /// Request that archival for a deployment stops.
    pub fn stop(&self, id: &str) -> Result<(), WatermarkError> {
        check_id(id)?;
        if self.store.delete(id)? {
            info!("Archival stop requested for deployment {id}", id: id);
            return Ok(());
        }
        if self.store.is_empty()? {
            Err(WatermarkError::NoDeployments)
        } else {
            Err(WatermarkError::NotRunning(id.to_string()))
        }
    }

    /// `None` once the deployment has been stopped.
    pub fn read(&self, id: &str) -> Result<Option<Watermark>, WatermarkError> {
        match self.store.get(id)? {
            None => Ok(None),
            Some(content) => content
                .parse::<Watermark>()
                .map(Some)
                .map_err(|_| WatermarkError::Corrupt {
                    id: id.to_string(),
                    content,
                }),
        }
    }

    /// Advance the marker to `at`, never moving it backwards and never
    /// recreating a stopped deployment. Returns the stored value, or `None`
    /// if the marker is gone.
    pub fn update(&self, id: &str, at: Watermark) -> Result<Option<Watermark>, WatermarkError> {
        let Some(previous) = self.read(id)? else {
            return Ok(None);
        };
        let next = at.max(previous);
        if self.store.replace(id, &next.to_string())? {
            debug!("Watermark for {id} set to {watermark}", id: id, watermark: next.to_string());
            Ok(Some(next))
        } else {
            Ok(None)
        }
    }
}

fn check_id(id: &str) -> Result<(), WatermarkError> {
    if id.trim().is_empty() {
        Err(WatermarkError::EmptyId)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_twice() {
        let marks = WatermarkStore::new(MemoryMarkerStore::new());
        marks.start("441").expect("first start");
        assert!(matches!(
            marks.start("441"),
            Err(WatermarkError::AlreadyRunning(ref id)) if id == "441"
        ));
    }

    #[test]
    fn test_stop_without_start() {
        let marks = WatermarkStore::new(MemoryMarkerStore::new());
        assert!(matches!(marks.stop("441"), Err(WatermarkError::NoDeployments)));

        marks.start("442").expect("start other");
        assert!(matches!(marks.stop("441"), Err(WatermarkError::NotRunning(_))));

        marks.stop("442").expect("stop running");
        assert!(marks.read("442").expect("read").is_none());
    }

    #[test]
    fn test_empty_id() {
        let marks = WatermarkStore::new(MemoryMarkerStore::new());
        assert!(matches!(marks.start(" "), Err(WatermarkError::EmptyId)));
        assert!(matches!(marks.stop(""), Err(WatermarkError::EmptyId)));
    }

    #[test]
    fn test_update_never_moves_backwards() {
        let marks = WatermarkStore::new(MemoryMarkerStore::new());
        let started = marks.start("441").expect("start");

        let stored = marks
            .update("441", Watermark::from_secs(10.0))
            .expect("update")
            .expect("still running");
        assert!((stored.as_secs() - started.as_secs()).abs() < 1e-5);

        let later = Watermark::from_secs(started.as_secs() + 60.0);
        let stored = marks.update("441", later).expect("update").expect("running");
        assert_eq!(stored, later);
        let reread = marks.read("441").expect("read").expect("present");
        assert!((reread.as_secs() - later.as_secs()).abs() < 1e-5);
    }

    #[test]
    fn test_update_does_not_recreate() {
        let marks = WatermarkStore::new(MemoryMarkerStore::new());
        marks.start("441").expect("start");
        marks.stop("441").expect("stop");
        assert!(marks.update("441", Watermark::now()).expect("update").is_none());
        assert!(marks.read("441").expect("read").is_none());
    }

    #[test]
    fn test_corrupt_marker() {
        let store = MemoryMarkerStore::new();
        store.insert("441", "yesterday").expect("insert");
        let marks = WatermarkStore::new(store);
        assert!(matches!(marks.read("441"), Err(WatermarkError::Corrupt { .. })));
    }

    #[test]
    fn test_file_markers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileMarkerStore::new(dir.path().join("deployments"));
        let path = store.marker_path("441");
        let marks = WatermarkStore::new(store);

        assert!(matches!(marks.stop("441"), Err(WatermarkError::NoDeployments)));

        let started = marks.start("441").expect("start");
        let text = std::fs::read_to_string(&path).expect("marker written");
        let parsed: Watermark = text.parse().expect("timestamp text");
        assert!((parsed.as_secs() - started.as_secs()).abs() < 1e-5);

        assert!(matches!(marks.start("441"), Err(WatermarkError::AlreadyRunning(_))));

        marks.stop("441").expect("stop");
        assert!(!path.exists());
        assert!(marks.update("441", Watermark::now()).expect("update").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_reads_foreign_timestamp_text() {
        // Markers written by other tools carry plain float text
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("441.txt"), "1550736235.1234567").expect("write");
        let marks = WatermarkStore::new(FileMarkerStore::new(dir.path()));
        let mark = marks.read("441").expect("read").expect("present");
        assert!((mark.as_secs() - 1_550_736_235.123_456_7).abs() < 1e-6);
    }
}
