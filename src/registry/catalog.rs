// ABOUTME: Directory-backed catalogue of word list sources
// ABOUTME: Discovers, loads, and drops sources as files appear and disappear

use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::error::{RegistryError, Result};
use crate::source::{Source, SourceSummary, DEFAULT_POLL_INTERVAL};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5);
const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub dir: PathBuf,
    pub extension: String,
    pub scan_interval: Duration,
    pub poll_interval: Duration,
}

impl RegistryConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn with_intervals(mut self, scan_interval: Duration, poll_interval: Duration) -> Self {
        self.scan_interval = scan_interval;
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("words"),
            extension: "txt".to_string(),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

struct Slot {
    source: Arc<Source>,
    poller: JoinHandle<()>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
}

pub struct Registry {
    config: RegistryConfig,
    sources: RwLock<HashMap<PathBuf, Slot>>,
    removals: mpsc::UnboundedSender<PathBuf>,
    shutdown: watch::Sender<bool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Registry {
    /// Load every word list in the configured directory and start watching it.
    pub async fn open(config: RegistryConfig) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.dir)
            .await
            .map_err(|source| RegistryError::DirectoryUnavailable {
                path: config.dir.clone(),
                source,
            })?;

        let (removals, removals_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let scan_interval = config.scan_interval;

        let registry = Arc::new(Self {
            config,
            sources: RwLock::new(HashMap::new()),
            removals,
            shutdown,
            monitor: Mutex::new(None),
        });

        let report = registry.sync_directory().await?;
        info!(
            "Word list registry ready: {} sources in {}",
            report.added,
            registry.config.dir.display()
        );

        let monitor = Self::spawn_monitor(
            Arc::downgrade(&registry),
            removals_rx,
            shutdown_rx,
            scan_interval,
        );
        *registry.monitor.lock().await = Some(monitor);

        Ok(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Diff the directory listing against the loaded set.
    ///
    /// New files are loaded in parallel; sources whose files are gone are
    /// closed and dropped.
    pub async fn sync_directory(&self) -> Result<SyncReport> {
        let dir = self.config.dir.clone();
        let extension = self.config.extension.clone();
        let current = tokio::task::spawn_blocking(move || list_word_files(&dir, &extension))
            .await?
            .map_err(|source| RegistryError::DirectoryUnavailable {
                path: self.config.dir.clone(),
                source,
            })?;

        let known: HashSet<PathBuf> = self.sources.read().await.keys().cloned().collect();
        let added: Vec<PathBuf> = current.difference(&known).cloned().collect();
        let removed: Vec<PathBuf> = known.difference(&current).cloned().collect();

        let mut report = SyncReport::default();

        if !added.is_empty() {
            debug!("Discovered {} new word lists", added.len());
            let loads = added
                .into_iter()
                .map(|path| tokio::spawn(async move { Source::open(path).await }));

            for result in join_all(loads).await {
                match result {
                    Ok(Ok(source)) => {
                        if self.insert(source).await {
                            report.added += 1;
                        }
                    }
                    Ok(Err(e)) => debug!("Skipping word list: {}", e),
                    Err(e) => error!("Word list load task failed: {}", e),
                }
            }
        }

        for path in removed {
            if self.remove(&path).await {
                info!("Word list deleted: {}", display_name(&path));
                report.removed += 1;
            }
        }

        Ok(report)
    }

    async fn insert(&self, source: Arc<Source>) -> bool {
        if self.is_shut_down() {
            source.close();
            return false;
        }

        let path = source.path().to_path_buf();
        let mut sources = self.sources.write().await;
        if sources.contains_key(&path) {
            drop(sources);
            source.close();
            return false;
        }

        let poller = source.spawn_poller(self.config.poll_interval, self.removals.clone());
        sources.insert(path, Slot { source, poller });
        true
    }

    async fn remove(&self, path: &Path) -> bool {
        let slot = self.sources.write().await.remove(path);
        match slot {
            Some(slot) => {
                slot.source.close();
                if let Err(e) = slot.poller.await {
                    debug!("Poller for {} ended abnormally: {}", path.display(), e);
                }
                true
            }
            None => false,
        }
    }

    /// Drop a source that closed itself, unless the path now holds a live one.
    async fn remove_closed(&self, path: &Path) {
        let closed = self
            .sources
            .read()
            .await
            .get(path)
            .map(|slot| slot.source.is_closed())
            .unwrap_or(false);

        if closed && self.remove(path).await {
            info!("Word list deleted: {}", display_name(path));
        }
    }

    fn spawn_monitor(
        registry: Weak<Self>,
        mut removals: mpsc::UnboundedReceiver<PathBuf>,
        mut shutdown: watch::Receiver<bool>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let mut ticker = tokio::time::interval(interval.max(MIN_SCAN_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::spawn(async move {
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    Some(path) = removals.recv() => {
                        let Some(registry) = registry.upgrade() else { break };
                        registry.remove_closed(&path).await;
                    }
                    _ = ticker.tick() => {
                        let Some(registry) = registry.upgrade() else { break };
                        match registry.sync_directory().await {
                            Ok(report) if report != SyncReport::default() => {
                                info!(
                                    "Word lists updated: {} added, {} removed",
                                    report.added, report.removed
                                );
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Directory scan failed: {}", e),
                        }
                    }
                }
            }

            debug!("Registry monitor stopped");
        })
    }

    /// Current sources, cloned out so no lock is held by the caller.
    pub async fn snapshot(&self) -> Vec<Arc<Source>> {
        self.sources
            .read()
            .await
            .values()
            .map(|slot| Arc::clone(&slot.source))
            .collect()
    }

    pub async fn sources(&self) -> Vec<SourceSummary> {
        let mut summaries = Vec::new();
        for source in self.snapshot().await {
            summaries.push(source.summary().await);
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.sources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop the monitor and every poller, then release all sources.
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }

        if let Some(monitor) = self.monitor.lock().await.take() {
            if let Err(e) = monitor.await {
                debug!("Registry monitor ended abnormally: {}", e);
            }
        }

        let slots: Vec<Slot> = self
            .sources
            .write()
            .await
            .drain()
            .map(|(_, slot)| slot)
            .collect();

        for slot in &slots {
            slot.source.close();
        }
        let count = slots.len();
        join_all(slots.into_iter().map(|slot| slot.poller)).await;

        info!("Registry shut down, released {} sources", count);
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        for slot in self.sources.get_mut().values() {
            slot.source.close();
        }
    }
}

fn list_word_files(dir: &Path, extension: &str) -> std::io::Result<HashSet<PathBuf>> {
    let mut files = HashSet::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let matches_extension = entry
            .path()
            .extension()
            .map(|ext| ext == std::ffi::OsStr::new(extension))
            .unwrap_or(false);

        if entry.file_type().is_file() && matches_extension {
            files.insert(entry.into_path());
        }
    }

    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
