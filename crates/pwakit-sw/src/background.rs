//! Detached background work whose completion callers never wait on.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;
use tracing::warn;

/// Tracks detached tasks so tests (and shutdown) can wait for them to settle.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    set: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a task on the current runtime without waiting for it.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.lock();
        // Reap whatever already finished so the set stays small.
        while let Some(result) = set.try_join_next() {
            if let Err(err) = result {
                warn!(error = %err, "Background task panicked");
            }
        }
        set.spawn(task);
    }

    /// Number of tasks not yet reaped.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait until every spawned task, including ones spawned meanwhile, has finished.
    pub async fn settle(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.lock());
            if set.is_empty() {
                break;
            }
            while let Some(result) = set.join_next().await {
                if let Err(err) = result {
                    warn!(error = %err, "Background task panicked");
                }
            }
        }
    }
}
