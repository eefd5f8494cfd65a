//! Bounded worker pool for per-machine checks.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// A fixed number of permits shared by every job submitted through any
/// clone of the pool.
///
/// One pool lives for the whole scheduler run, so the width bounds the
/// total number of concurrent machine checks, not a per-region number.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    width: usize,
}

impl WorkerPool {
    /// Create a pool running at most `width` jobs at once (at least one).
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            permits: Arc::new(Semaphore::new(width)),
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `job` for every item and wait for all of them.
    ///
    /// Results come back in completion order. A job that panics shows up
    /// as its `JoinError`; the other jobs are unaffected.
    pub async fn run_all<I, F, Fut, T>(&self, items: I, mut job: F) -> Vec<Result<T, JoinError>>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for item in items {
            let permits = self.permits.clone();
            let work = job(item);
            tasks.spawn(async move {
                // The semaphore is never closed; the permit is held until
                // the job finishes.
                let _permit = permits.acquire_owned().await;
                work.await
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(result) = tasks.join_next().await {
            results.push(result);
        }
        results
    }
}
