use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::entry::{JobEntry, JobStatus};
use super::traits::QueueProvider;
use super::JobError;

/// In-process [`QueueProvider`]; entries are lost on restart.
///
/// Clones share the same entries, so a handle can be kept for inspection
/// after the queue is registered with [`Queues`](super::Queues).
#[derive(Clone, Default)]
pub struct MemoryQueue {
    entries: Arc<Mutex<Vec<JobEntry>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, finished ones included.
    pub async fn entries(&self) -> Vec<JobEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn pending(&self) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.status == JobStatus::Pending)
            .count()
    }
}

#[async_trait]
impl QueueProvider for MemoryQueue {
    async fn insert(&self, entry: &JobEntry) -> Result<(), JobError> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<JobEntry>, JobError> {
        let mut entries = self.entries.lock().await;
        let now = OffsetDateTime::now_utc();

        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.status == JobStatus::Pending && e.run_at <= now)
        else {
            return Ok(None);
        };

        entry.status = JobStatus::Running;
        entry.locked_at = Some(now);
        entry.locked_by = Some(worker_id.to_string());
        entry.attempts += 1;
        Ok(Some(entry.clone()))
    }

    async fn update(&self, entry: &JobEntry) -> Result<(), JobError> {
        let mut entries = self.entries.lock().await;
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(JobError::Other(format!("job {} not found", entry.id))),
        }
    }
}
