use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use echo_common::id::{prefix, prefixed_ulid};
use rand::Rng;
use tokio::task::JoinHandle;

/// Delayed assistant posts, tracked by correlation ID until they fire.
///
/// A pending post outlives the connection that triggered it; only
/// [`cancel`](Self::cancel) or [`shutdown`](Self::shutdown) stop it.
#[derive(Clone, Default)]
pub struct AssistantScheduler {
    tasks: Arc<DashMap<String, JoinHandle<()>>>,
}

impl AssistantScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` after `delay`. Returns the correlation ID.
    pub fn schedule<F>(&self, delay: Duration, job: F) -> String
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = prefixed_ulid(prefix::ASSISTANT_TASK);
        let tasks = Arc::clone(&self.tasks);
        let key = id.clone();

        // Insert under the entry lock so the task cannot deregister before it is registered.
        self.tasks.entry(id.clone()).or_insert_with(|| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                job.await;
                tasks.remove(&key);
            })
        });

        id
    }

    pub fn cancel(&self, id: &str) -> bool {
        match self.tasks.remove(id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Abort everything still waiting.
    pub fn shutdown(&self) {
        self.tasks.retain(|_, handle| {
            handle.abort();
            false
        });
    }
}

/// Uniform delay in `[min, max]`, at millisecond resolution.
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let lo_ms = lo.as_millis() as u64;
    let hi_ms = hi.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(lo_ms..=hi_ms))
}
