//! Named job queues used for deferred mail delivery.
//!
//! - [`Job`]: serializable payload plus the logic that runs it.
//! - [`QueueProvider`]: storage for [`JobEntry`] rows; [`MemoryQueue`] ships in-process.
//! - [`Queues`]: providers by name. The first one registered is the default queue.
//! - [`JobRegistry`] and [`Worker`]: claim entries and dispatch them by job type.
//!
//! ```ignore
//! let mail_queue = MemoryQueue::new();
//! let queues = Queues::new().with("mail", mail_queue.clone());
//!
//! queues.push(&job, None).await?;                              // default queue
//! queues.later(&job, Duration::from_secs(600), Some("mail")).await?;
//!
//! let registry = JobRegistry::new().register::<PurgeBounces>();
//! Worker::new(queues.get(Some("mail"))?, registry, app_state).start();
//! ```

mod entry;
mod memory;
mod registry;
mod traits;
mod worker;

pub use entry::{JobEntry, JobOpts, JobStatus};
pub use memory::MemoryQueue;
pub use registry::JobRegistry;
pub use traits::{Job, JobResult, QueueProvider};
pub use worker::Worker;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("queue [{0}] is not defined")]
    UnknownQueue(String),
    #[error("no queue has been configured")]
    NoQueue,
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Queue providers by name.
#[derive(Clone, Default)]
pub struct Queues {
    providers: Vec<(String, Arc<dyn QueueProvider>)>,
}

impl Queues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `name`, replacing any earlier one.
    pub fn with(self, name: impl Into<String>, provider: impl QueueProvider) -> Self {
        self.with_shared(name, Arc::new(provider))
    }

    pub fn with_shared(mut self, name: impl Into<String>, provider: Arc<dyn QueueProvider>) -> Self {
        let name = name.into();
        match self.providers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = provider,
            None => self.providers.push((name, provider)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.providers.first().map(|(name, _)| name.as_str())
    }

    /// Resolve a queue by name, falling back to the default queue.
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn QueueProvider>, JobError> {
        self.resolve(name).map(|(_, provider)| provider.clone())
    }

    /// Push a job now.
    pub async fn push<J: Job>(&self, job: &J, queue: Option<&str>) -> Result<Uuid, JobError> {
        self.push_with(job, J::default_opts(), queue).await
    }

    /// Push a job that becomes eligible after `delay`.
    pub async fn later<J: Job>(
        &self,
        job: &J,
        delay: Duration,
        queue: Option<&str>,
    ) -> Result<Uuid, JobError> {
        self.push_with(job, J::default_opts().delay(delay), queue)
            .await
    }

    pub async fn push_with<J: Job>(
        &self,
        job: &J,
        opts: JobOpts,
        queue: Option<&str>,
    ) -> Result<Uuid, JobError> {
        let (name, provider) = self.resolve(queue)?;
        let entry = JobEntry::new(name, J::JOB_TYPE, serde_json::to_value(job)?, &opts)?;
        provider.insert(&entry).await?;
        tracing::debug!(job_id = %entry.id, job_type = J::JOB_TYPE, queue = name, "job queued");
        Ok(entry.id)
    }

    fn resolve(&self, name: Option<&str>) -> Result<(&str, &Arc<dyn QueueProvider>), JobError> {
        let found = match name {
            Some(name) => self.providers.iter().find(|(n, _)| n == name),
            None => self.providers.first(),
        };
        match (found, name) {
            (Some((n, provider)), _) => Ok((n.as_str(), provider)),
            (None, Some(name)) => Err(JobError::UnknownQueue(name.to_string())),
            (None, None) => Err(JobError::NoQueue),
        }
    }
}

impl std::fmt::Debug for Queues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|(name, _)| name))
            .finish()
    }
}
