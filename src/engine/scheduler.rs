// ABOUTME: Scheduler for deferred template invocations
// ABOUTME: Runs delayed re-evaluations as joinable tasks that can be drained on shutdown

use std::sync::{Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::context::InvocationContext;
use super::evaluator::ReplyEngine;

pub struct DeferredScheduler {
    state: Mutex<SchedulerState>,
}

struct SchedulerState {
    tasks: JoinSet<()>,
    accepting: bool,
}

impl DeferredScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                tasks: JoinSet::new(),
                accepting: true,
            }),
        }
    }

    /// Queue a re-evaluation of `context.trigger` after `delay`.
    ///
    /// The task holds only a weak engine handle; if the engine is gone when
    /// the delay elapses the task does nothing. Returns false once shut down.
    pub fn schedule(
        &self,
        engine: Weak<ReplyEngine>,
        delay: Option<Duration>,
        context: InvocationContext,
    ) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.accepting {
            warn!(
                "Dropping deferred call '{}': scheduler is shut down",
                context.trigger
            );
            return false;
        }

        // Reap finished tasks so the set does not grow without bound.
        while state.tasks.try_join_next().is_some() {}

        debug!(
            "Scheduling deferred call '{}' after {:?}",
            context.trigger,
            delay.unwrap_or_default()
        );

        state.tasks.spawn(async move {
            if let Some(delay) = delay {
                sleep(delay).await;
            }

            match engine.upgrade() {
                Some(engine) => engine.run_deferred(context).await,
                None => debug!("Engine dropped before deferred call '{}'", context.trigger),
            }
        });

        true
    }

    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .len()
    }

    /// Stop accepting work, wait up to `grace` for queued calls, then abort the rest.
    pub async fn shutdown(&self, grace: Duration) {
        let mut tasks = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.accepting = false;
            std::mem::take(&mut state.tasks)
        };

        if tasks.is_empty() {
            return;
        }

        let outstanding = tasks.len();
        let drained = timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => info!("Deferred scheduler drained {} calls", outstanding),
            Err(_) => {
                warn!(
                    "Aborting {} deferred calls still pending after {:?}",
                    tasks.len(),
                    grace
                );
                tasks.shutdown().await;
            }
        }
    }
}

impl Default for DeferredScheduler {
    fn default() -> Self {
        Self::new()
    }
}
