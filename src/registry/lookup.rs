// ABOUTME: Parallel trigger lookup across every loaded word list
// ABOUTME: Each source answers with at most one match, timed individually

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument};

use super::catalog::Registry;
use crate::source::{Entry, Source};

#[derive(Debug, Clone)]
pub struct Match {
    pub source: Arc<Source>,
    pub entry: Arc<Entry>,
    pub generation: u64,
    pub cost: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct Lookup {
    pub matches: Vec<Match>,
    pub elapsed: Duration,
}

impl Lookup {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl Registry {
    /// Fan `trigger` out to every source concurrently.
    ///
    /// Matches are sorted by source name so output is stable, but no caller
    /// should depend on the relative order of sources.
    #[instrument(skip(self))]
    pub async fn find(&self, trigger: &str) -> Lookup {
        let started = Instant::now();
        let sources = self.snapshot().await;
        let trigger: Arc<str> = Arc::from(trigger);

        let queries = sources.into_iter().map(|source| {
            let trigger = Arc::clone(&trigger);
            tokio::spawn(async move {
                let query_start = Instant::now();
                let found = source.find(&trigger).await;
                found.map(|found| Match {
                    source,
                    entry: found.entry,
                    generation: found.generation,
                    cost: query_start.elapsed(),
                })
            })
        });

        let mut matches = Vec::new();
        for result in join_all(queries).await {
            match result {
                Ok(Some(found)) => matches.push(found),
                Ok(None) => {}
                Err(e) => error!("Lookup task failed: {}", e),
            }
        }
        matches.sort_by(|a, b| a.source.name().cmp(b.source.name()));

        let elapsed = started.elapsed();
        debug!("{} matches in {:?}", matches.len(), elapsed);

        Lookup { matches, elapsed }
    }
}
