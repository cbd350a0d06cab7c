//! Startup cache warm-up.
//!
//! [`spawn_warmup`] runs every fetcher once on a background Tokio task so the
//! first visitor does not pay for the remote calls. It never blocks startup and
//! never fails the process: errors are logged and dropped.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::Warm;

/// Handle to the warm-up task.
///
/// Dropping the handle detaches the task; call [`abort`](Self::abort) on
/// shutdown to cancel a warm-up that is still waiting on the remote side.
pub struct WarmupHandle {
    task: JoinHandle<()>,
}

impl WarmupHandle {
    /// Waits for the warm-up to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "cache warm-up task panicked");
            }
        }
    }

    /// Cancels the warm-up if it is still running.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns a task that calls `get()` on each fetcher once, in order.
pub fn spawn_warmup(fetchers: Vec<Arc<dyn Warm>>) -> WarmupHandle {
    info!(fetchers = fetchers.len(), "starting background cache warm-up");

    let task = tokio::spawn(async move {
        for fetcher in &fetchers {
            match fetcher.warm().await {
                Ok(()) => info!(fetcher = fetcher.name(), "cache warmed"),
                Err(e) => warn!(fetcher = fetcher.name(), error = %e, "cache warm-up failed"),
            }
        }
        info!("background cache warm-up finished");
    });

    WarmupHandle { task }
}
