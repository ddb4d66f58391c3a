//! A single deletion worker

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc::Receiver;

use crate::storage::Storage;

use super::DeletionJob;

/// Takes jobs from the shared queue, one at a time, until the queue is closed and drained
pub(super) struct Worker<S: Storage> {
    /// Worker number, for logging
    id: usize,

    /// Storage to delete from
    storage: S,

    /// Consuming side of the queue, shared by all workers
    receiver: Arc<Mutex<Receiver<DeletionJob>>>,

    /// Maximum number of tokens per storage call
    chunk_size: usize,
}

impl<S: Storage> Worker<S> {
    pub(super) fn new(
        id: usize,
        storage: S,
        receiver: Arc<Mutex<Receiver<DeletionJob>>>,
        chunk_size: usize,
    ) -> Self {
        Self {
            id,
            storage,
            receiver,
            chunk_size,
        }
    }

    pub(super) async fn run(self) {
        tracing::debug!(worker = self.id, "Deletion worker started");

        while let Some(job) = self.next_job().await {
            self.process(job).await;
        }

        tracing::debug!(worker = self.id, "Deletion worker stopped");
    }

    /// Wait for the next job
    ///
    /// `None` once the queue is closed and nothing is left in it
    async fn next_job(&self) -> Option<DeletionJob> {
        self.receiver.lock().await.recv().await
    }

    async fn process(&self, job: DeletionJob) {
        let DeletionJob { user_id, tokens } = job;

        tracing::debug!(
            worker = self.id,
            user_id = %user_id,
            tokens = tokens.len(),
            "Deleting short URLs"
        );

        for chunk in tokens.chunks(self.chunk_size) {
            if let Err(err) = self.storage.mark_deleted_batch(chunk, &user_id).await {
                // not retried
                tracing::error!(
                    worker = self.id,
                    user_id = %user_id,
                    tokens = ?chunk,
                    "Could not mark short URLs as deleted: {err}"
                );
            }
        }
    }
}
