// ABOUTME: A single loaded word list with its private variable store
// ABOUTME: Handles generation swaps on reload and the per-file modification poller

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::fs;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{ParseError, Result, SourceError};
use super::parser::{parse_entries, Entry};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Everything swapped in one piece on reload.
#[derive(Debug, Default)]
struct Generation {
    number: u64,
    entries: Vec<Arc<Entry>>,
    modified: Option<SystemTime>,
    globals: HashMap<String, String>,
    diagnostics: Vec<ParseError>,
}

pub struct Source {
    path: PathBuf,
    name: String,
    state: RwLock<Generation>,
    closed: watch::Sender<bool>,
}

/// The first entry answering a trigger, tagged with the generation it was read from.
#[derive(Debug, Clone)]
pub struct SourceMatch {
    pub entry: Arc<Entry>,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub entries: usize,
    pub generation: u64,
    pub diagnostics: Vec<ParseError>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub path: PathBuf,
    pub entries: usize,
    pub generation: u64,
    pub diagnostics: Vec<String>,
}

impl Source {
    fn empty(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let (closed, _) = watch::channel(false);

        Self {
            path,
            name,
            state: RwLock::new(Generation::default()),
            closed,
        }
    }

    /// Load a word list from disk.
    ///
    /// A file that exists but cannot be read yet is kept with an empty
    /// generation so the poller can pick it up once it is fixed. Only a
    /// missing file is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let source = Arc::new(Self::empty(path.into()));

        match source.reload().await {
            Ok(report) => {
                info!(
                    "Loaded word list [{}]: {} entries in {:.3}s",
                    source.name,
                    report.entries,
                    report.elapsed.as_secs_f64()
                );
            }
            Err(e) if e.is_vanished() => return Err(e),
            Err(e) => warn!("Word list [{}] registered empty: {}", source.name, e),
        }

        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name shown to users and in `%Source%`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Stop the poller and make the source answer no further queries.
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            debug!("Closed word list [{}]", self.name);
        }
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.number
    }

    /// Re-read and re-parse the file unconditionally.
    pub async fn reload(&self) -> Result<LoadReport> {
        let modified = self.modified_time().await?;
        self.reload_at(modified).await
    }

    /// Reload if the file's modification time moved past the loaded one.
    ///
    /// Returns whether a new generation was swapped in.
    pub async fn refresh(&self) -> Result<bool> {
        let modified = self.modified_time().await?;
        let known = self.state.read().await.modified;

        if known.map_or(true, |known| modified > known) {
            info!("Hot reloading word list [{}]", self.name);
            let report = self.reload_at(modified).await?;
            debug!(
                "Word list [{}] now at generation {} with {} entries",
                self.name, report.generation, report.entries
            );
            return Ok(true);
        }

        Ok(false)
    }

    async fn modified_time(&self) -> Result<SystemTime> {
        let metadata = fs::metadata(&self.path)
            .await
            .map_err(|e| SourceError::from_io(self.path.clone(), e))?;
        metadata
            .modified()
            .map_err(|e| SourceError::from_io(self.path.clone(), e))
    }

    async fn reload_at(&self, modified: SystemTime) -> Result<LoadReport> {
        let started = Instant::now();
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                let err = SourceError::from_io(self.path.clone(), e);
                if !err.is_vanished() {
                    // Retry only once the file changes again.
                    self.state.write().await.modified = Some(modified);
                }
                return Err(err);
            }
        };

        let outcome = parse_entries(&content);
        for diagnostic in &outcome.diagnostics {
            warn!("Word list [{}]: {}", self.name, diagnostic);
        }

        let entries: Vec<Arc<Entry>> = outcome.entries.into_iter().map(Arc::new).collect();
        let entry_count = entries.len();

        let mut state = self.state.write().await;
        let number = state.number + 1;
        *state = Generation {
            number,
            entries,
            modified: Some(modified),
            globals: HashMap::new(),
            diagnostics: outcome.diagnostics.clone(),
        };
        drop(state);

        Ok(LoadReport {
            entries: entry_count,
            generation: number,
            diagnostics: outcome.diagnostics,
            elapsed: started.elapsed(),
        })
    }

    /// First entry in file order whose alias set contains `trigger` exactly.
    pub async fn find(&self, trigger: &str) -> Option<SourceMatch> {
        if self.is_closed() {
            return None;
        }

        let state = self.state.read().await;
        state
            .entries
            .iter()
            .find(|entry| entry.matches(trigger))
            .map(|entry| SourceMatch {
                entry: Arc::clone(entry),
                generation: state.number,
            })
    }

    /// Read a persistent variable, provided `generation` is still current.
    pub async fn global(&self, generation: u64, key: &str) -> Option<String> {
        let state = self.state.read().await;
        if state.number != generation {
            return None;
        }
        state.globals.get(key).cloned()
    }

    /// Store a persistent variable. Writes from a superseded generation are dropped.
    pub async fn set_global(&self, generation: u64, key: String, value: String) -> bool {
        let mut state = self.state.write().await;
        if state.number != generation {
            debug!(
                "Dropping global '{}' for stale generation {} of [{}]",
                key, generation, self.name
            );
            return false;
        }
        state.globals.insert(key, value);
        true
    }

    pub async fn summary(&self) -> SourceSummary {
        let state = self.state.read().await;
        SourceSummary {
            name: self.name.clone(),
            path: self.path.clone(),
            entries: state.entries.len(),
            generation: state.number,
            diagnostics: state.diagnostics.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Spawn the per-file modification poller.
    ///
    /// When the file disappears the source closes itself and reports its
    /// path on `removals`.
    pub fn spawn_poller(
        self: &Arc<Self>,
        interval: Duration,
        removals: mpsc::UnboundedSender<PathBuf>,
    ) -> JoinHandle<()> {
        let source = Arc::clone(self);
        let mut closed = self.closed.subscribe();
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::spawn(async move {
            // The first tick completes immediately and the file was just loaded.
            ticker.tick().await;

            while !source.is_closed() {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = closed.changed() => {}
                }

                if source.is_closed() {
                    break;
                }

                match source.refresh().await {
                    Ok(_) => {}
                    Err(e) if e.is_vanished() => {
                        warn!("Word list removed: [{}]", source.name);
                        source.close();
                        let _ = removals.send(source.path.clone());
                        break;
                    }
                    Err(e) => warn!("Poll failed for [{}]: {}", source.name, e),
                }
            }

            debug!("Poller for [{}] stopped", source.name);
        })
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn bump_mtime(path: &Path, secs: u64) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_and_find_first_match_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("greetings.txt");
        std::fs::write(&path, "hi\nfirst\n\nhi|hello\nsecond\n").unwrap();

        let source = Source::open(&path).await.unwrap();
        assert_eq!(source.name(), "greetings.txt");

        let found = source.find("hi").await.unwrap();
        assert_eq!(found.entry.lines, vec!["first"]);
        assert_eq!(found.entry.line, 1);

        let found = source.find("hello").await.unwrap();
        assert_eq!(found.entry.lines, vec!["second"]);

        assert!(source.find("h").await.is_none());
        assert!(source.find("hi ").await.is_none());
    }

    #[tokio::test]
    async fn test_open_missing_file_is_vanished() {
        let dir = tempdir().unwrap();
        let result = Source::open(dir.path().join("nope.txt")).await;
        assert!(matches!(result, Err(SourceError::Vanished { .. })));
    }

    #[tokio::test]
    async fn test_refresh_swaps_generation_and_clears_globals() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, "hi\nold\n").unwrap();

        let source = Source::open(&path).await.unwrap();
        let generation = source.generation().await;
        assert!(source.set_global(generation, "g".into(), "v".into()).await);
        assert_eq!(source.global(generation, "g").await.as_deref(), Some("v"));

        assert!(!source.refresh().await.unwrap());

        std::fs::write(&path, "hi\nnew\n").unwrap();
        bump_mtime(&path, 5);
        assert!(source.refresh().await.unwrap());

        let current = source.generation().await;
        assert_eq!(current, generation + 1);
        assert_eq!(source.find("hi").await.unwrap().entry.lines, vec!["new"]);
        assert!(source.global(current, "g").await.is_none());
        assert!(!source.set_global(generation, "g".into(), "stale".into()).await);
        assert!(source.global(current, "g").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_generation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, "hi\nkept\n").unwrap();

        let source = Source::open(&path).await.unwrap();
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0xc3]).unwrap();
        bump_mtime(&path, 5);

        let result = source.refresh().await;
        assert!(matches!(result, Err(SourceError::Io { .. })));
        assert_eq!(source.find("hi").await.unwrap().entry.lines, vec!["kept"]);
        assert_eq!(source.generation().await, 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_registered_empty_until_fixed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0xc3]).unwrap();

        let source = Source::open(&path).await.unwrap();
        assert!(source.find("hi").await.is_none());
        assert_eq!(source.generation().await, 0);

        // Unchanged file: no re-read until the mtime moves.
        assert!(!source.refresh().await.unwrap());

        std::fs::write(&path, "hi\nfixed\n").unwrap();
        bump_mtime(&path, 5);

        assert!(source.refresh().await.unwrap());
        assert_eq!(source.find("hi").await.unwrap().entry.lines, vec!["fixed"]);
        assert_eq!(source.generation().await, 1);
    }

    #[tokio::test]
    async fn test_failed_reload_is_not_retried_until_modified() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, "hi\nkept\n").unwrap();

        let source = Source::open(&path).await.unwrap();
        std::fs::write(&path, [0xff, 0xfe]).unwrap();
        bump_mtime(&path, 5);

        assert!(source.refresh().await.is_err());
        assert!(!source.refresh().await.unwrap());
        assert_eq!(source.find("hi").await.unwrap().entry.lines, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_closed_source_answers_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, "hi\nhello\n").unwrap();

        let source = Source::open(&path).await.unwrap();
        source.close();
        assert!(source.is_closed());
        assert!(source.find("hi").await.is_none());
    }

    #[tokio::test]
    async fn test_poller_reports_removal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, "hi\nhello\n").unwrap();

        let source = Source::open(&path).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = source.spawn_poller(Duration::from_millis(20), tx);

        std::fs::remove_file(&path).unwrap();
        let removed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(removed, path);
        assert!(source.is_closed());
        poller.await.unwrap();
    }

    #[tokio::test]
    async fn test_poller_stops_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, "hi\nhello\n").unwrap();

        let source = Source::open(&path).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let poller = source.spawn_poller(Duration::from_secs(60), tx);

        source.close();
        tokio::time::timeout(Duration::from_secs(2), poller)
            .await
            .unwrap()
            .unwrap();
    }
}
