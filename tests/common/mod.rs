// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides a temporary word list directory and polling helpers

#![allow(dead_code)]

use std::fs::{self, File};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use replybook::engine::{EngineConfig, ReplyEngine};
use replybook::registry::{Registry, RegistryConfig};
use replybook::transport::{ChannelSink, Delivery};
use tokio::sync::mpsc;

pub const FAST_POLL: Duration = Duration::from_millis(20);
pub const FAST_SCAN: Duration = Duration::from_millis(40);

pub struct WordsDir {
    pub temp_dir: TempDir,
    writes: AtomicU64,
}

impl WordsDir {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            writes: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Write a word list and push its mtime forward so every write is seen
    /// as newer than the last, regardless of filesystem timestamp resolution.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        self.write_bytes(name, content.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.file(name);
        fs::write(&path, content).expect("Failed to write word list");

        let bump = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let modified = SystemTime::now() + Duration::from_secs(bump * 10);
        File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(modified))
            .expect("Failed to bump modification time");

        path
    }

    pub fn remove(&self, name: &str) {
        fs::remove_file(self.file(name)).expect("Failed to remove word list");
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::new(self.path()).with_intervals(FAST_SCAN, FAST_POLL)
    }

    pub async fn open_registry(&self) -> Arc<Registry> {
        Registry::open(self.registry_config())
            .await
            .expect("Failed to open registry")
    }

    pub async fn open_engine(
        &self,
        config: EngineConfig,
    ) -> (Arc<ReplyEngine>, mpsc::UnboundedReceiver<Delivery>) {
        let registry = self.open_registry().await;
        let (sink, deliveries) = ChannelSink::new();
        (ReplyEngine::new(registry, Arc::new(sink), config), deliveries)
    }
}

/// Poll `check` until it returns true or `limit` passes.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Reply texts in source order.
pub fn texts(replies: &[replybook::Reply]) -> Vec<String> {
    replies.iter().map(|r| r.text.clone()).collect()
}
