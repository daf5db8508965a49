//! Bounded pool running media processor jobs off the async runtime.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::processor::{MediaProcessor, ProcessingError, ProcessingJob};

/// Runs [`MediaProcessor`] jobs on blocking threads, at most `size` at a time.
///
/// Sessions waiting for a slot only suspend themselves; other connections
/// keep being served.
#[derive(Clone)]
pub struct WorkerPool {
    processor: Arc<dyn MediaProcessor>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl WorkerPool {
    /// Creates a pool of `size` workers (at least one) around `processor`.
    pub fn new(processor: Arc<dyn MediaProcessor>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            processor,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Number of jobs that may run at once.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `job` and waits for its outcome.
    pub async fn run(&self, job: ProcessingJob) -> Result<(), ProcessingError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ProcessingError::Worker(e.to_string()))?;

        let processor = Arc::clone(&self.processor);
        debug!(operation = %job.operation, input = %job.input.display(), "Dispatching job to worker");

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            processor.process(&job)
        })
        .await
        .map_err(|e| ProcessingError::Worker(e.to_string()))?
    }
}
