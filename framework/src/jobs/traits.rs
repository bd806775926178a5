use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use super::entry::{JobEntry, JobOpts};
use super::JobError;

/// A serializable unit of deferred work.
///
/// The job's fields become the queued payload and `perform` runs once a
/// [`Worker`](super::Worker) claims it. Queued mailables are delivered through
/// this trait (see [`QueuedMailableJob`](crate::QueuedMailableJob)).
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct PurgeBounces { older_than_days: u32 }
///
/// #[async_trait]
/// impl Job for PurgeBounces {
///     const JOB_TYPE: &'static str = "purge_bounces";
///     type Context = AppState;
///
///     async fn perform(self, ctx: &AppState) -> JobResult {
///         ctx.bounces.purge(self.older_than_days).await?;
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier stored with every entry and used to find the handler.
    const JOB_TYPE: &'static str;

    /// Application state handed to `perform`.
    type Context: Send + Sync + 'static;

    fn default_opts() -> JobOpts {
        JobOpts::default()
    }

    /// Run the job. `Ok(Some(value))` is stored on the entry as its result.
    async fn perform(self, ctx: &Self::Context) -> JobResult;
}

pub type JobResult = Result<Option<serde_json::Value>, Box<dyn std::error::Error + Send + Sync>>;

/// Storage behind a named queue.
///
/// Providers are shared as `Arc<dyn QueueProvider>` by [`Queues`](super::Queues)
/// and [`Worker`](super::Worker), so implementations only need interior
/// mutability. The worker owns every state transition and writes entries back
/// through `update`.
#[async_trait]
pub trait QueueProvider: Send + Sync + 'static {
    async fn insert(&self, entry: &JobEntry) -> Result<(), JobError>;

    /// Claim the next pending entry whose `run_at` has passed.
    ///
    /// The claimed entry must be marked `Running`, locked by `worker_id`
    /// and have its `attempts` incremented before it is returned.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<JobEntry>, JobError>;

    async fn update(&self, entry: &JobEntry) -> Result<(), JobError>;
}
