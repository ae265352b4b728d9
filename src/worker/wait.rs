//! Keep-alive tracking for work that outlives a handler
//!
//! A handler that starts background work (storing a response copy, for
//! instance) registers it here. The reactor settles every registered task
//! before it lets the worker stop.

use futures_util::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Clone, Default)]
pub struct WaitUntil {
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WaitUntil {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` in the background and keep the worker alive until it ends
    pub fn spawn<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        let mut pending = self.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Number of registered tasks still running
    pub fn pending(&self) -> usize {
        let mut pending = self.lock();
        pending.retain(|h| !h.is_finished());
        pending.len()
    }

    /// Wait for every registered task, including ones registered meanwhile
    pub async fn settle(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                return;
            }
            for result in join_all(batch).await {
                if let Err(e) = result {
                    warn!("Background task failed: {}", e);
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        // A poisoned list is still a valid list of handles
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
