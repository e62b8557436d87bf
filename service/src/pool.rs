//! Bounded pool for blocking ledger and spin work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error as ThisError;
use tokio::sync::Semaphore;

#[derive(Debug, ThisError)]
pub enum PoolError {
    #[error("worker pool saturated ({admitted} jobs admitted, limit {limit})")]
    Saturated { admitted: usize, limit: usize },
    #[error("worker pool closed")]
    Closed,
    #[error("worker task failed: {0}")]
    Join(String),
}

/// Runs blocking jobs on Tokio's blocking threads, at most `workers` at a time.
///
/// Up to `backlog` further jobs wait for a worker; anything beyond that is rejected
/// immediately with [`PoolError::Saturated`].
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    admitted: Arc<AtomicUsize>,
    limit: usize,
}

struct Admission(Arc<AtomicUsize>);

impl Drop for Admission {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool {
    pub fn new(workers: usize, backlog: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            admitted: Arc::new(AtomicUsize::new(0)),
            limit: workers.saturating_add(backlog),
        }
    }

    /// Jobs currently running or waiting for a worker.
    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let admitted = self.admitted.fetch_add(1, Ordering::AcqRel);
        let admission = Admission(Arc::clone(&self.admitted));
        if admitted >= self.limit {
            return Err(PoolError::Saturated {
                admitted,
                limit: self.limit,
            });
        }

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _admission = admission;
            job()
        });
        handle.await.map_err(|err| PoolError::Join(err.to_string()))
    }
}
