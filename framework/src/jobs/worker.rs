use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::Instrument;

use super::entry::{JobEntry, JobStatus};
use super::registry::JobRegistry;
use super::traits::QueueProvider;
use super::JobError;

/// Polls one queue and runs the entries it claims.
///
/// Failed entries are retried with exponential backoff (capped at five
/// minutes) until `max_attempts` is reached; expired entries are skipped.
///
/// ```ignore
/// let registry = JobRegistry::new()
///     .register_mailable::<WelcomeMail>()
///     .register_mailable::<InvoicePaid>();
///
/// Worker::new(queues.get(Some("mail"))?, registry, manager)
///     .concurrency(8)
///     .start();
/// ```
pub struct Worker<S: Send + Sync + 'static> {
    queue: Arc<dyn QueueProvider>,
    registry: Arc<JobRegistry<S>>,
    ctx: Arc<S>,
    concurrency: usize,
    poll_interval: Duration,
    worker_id: String,
}

impl<S: Send + Sync + 'static> Worker<S> {
    pub fn new(queue: Arc<dyn QueueProvider>, registry: JobRegistry<S>, ctx: S) -> Self {
        Self::with_shared_context(queue, registry, Arc::new(ctx))
    }

    pub fn with_shared_context(
        queue: Arc<dyn QueueProvider>,
        registry: JobRegistry<S>,
        ctx: Arc<S>,
    ) -> Self {
        Self {
            queue,
            registry: Arc::new(registry),
            ctx,
            concurrency: 4,
            poll_interval: Duration::from_secs(1),
            worker_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Jobs processed in parallel (default: 4).
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Idle polling interval (default: 1s).
    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    /// Claim and run every eligible entry in turn, then return how many ran.
    ///
    /// Useful in tests and one-shot commands where a background loop is
    /// not wanted.
    pub async fn run_pending(&self) -> Result<usize, JobError> {
        let mut processed = 0;
        while let Some(entry) = self.queue.claim_next(&self.worker_id).await? {
            process(entry, &self.queue, &self.registry, &self.ctx).await;
            processed += 1;
        }
        Ok(processed)
    }

    /// Spawn the polling loop on the tokio runtime and return immediately.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let Worker {
            queue,
            registry,
            ctx,
            concurrency,
            poll_interval,
            worker_id,
        } = self;

        log::info!("worker {worker_id} running with concurrency {concurrency}");

        tokio::spawn(async move {
            let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency));
            let mut idle_streak: u32 = 0;

            loop {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };

                let entry = match queue.claim_next(&worker_id).await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => {
                        drop(permit);
                        idle_streak = idle_streak.saturating_add(1);
                        let backoff =
                            poll_interval.mul_f64((1.5_f64).min(1.0 + idle_streak as f64 * 0.1));
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    Err(e) => {
                        drop(permit);
                        tracing::error!(error = %e, "failed to poll queue");
                        tokio::time::sleep(poll_interval).await;
                        continue;
                    }
                };

                idle_streak = 0;

                let queue = queue.clone();
                let registry = registry.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    process(entry, &queue, &registry, &ctx).await;
                });
            }
        })
    }
}

async fn process<S: Send + Sync + 'static>(
    mut entry: JobEntry,
    queue: &Arc<dyn QueueProvider>,
    registry: &JobRegistry<S>,
    ctx: &Arc<S>,
) {
    let job_id = entry.id;
    let job_type = entry.job_type.clone();

    if entry
        .expires_at
        .is_some_and(|expires_at| expires_at < OffsetDateTime::now_utc())
    {
        tracing::info!(%job_id, %job_type, "job expired, skipping");
        entry.finish(JobStatus::Expired);
        write_back(queue, &entry).await;
        return;
    }

    let Some(handler) = registry.get(&job_type).cloned() else {
        tracing::error!(%job_id, %job_type, "no handler registered");
        entry.last_error = Some("unknown job type".to_string());
        entry.finish(JobStatus::Failed);
        write_back(queue, &entry).await;
        return;
    };

    let span = tracing::info_span!("job", %job_id, %job_type, queue = %entry.queue);
    match handler(entry.payload.clone(), ctx.clone()).instrument(span).await {
        Ok(result) => {
            tracing::info!(%job_id, %job_type, "job completed");
            entry.result = result;
            entry.finish(JobStatus::Completed);
        }
        Err(e) => {
            let error_msg = e.to_string();
            entry.last_error = Some(error_msg.clone());

            if entry.attempts < entry.max_attempts {
                let backoff_secs = 2_u64.saturating_pow(entry.attempts.max(0) as u32).min(300);
                entry.status = JobStatus::Pending;
                entry.locked_at = None;
                entry.locked_by = None;
                entry.run_at = OffsetDateTime::now_utc() + Duration::from_secs(backoff_secs);
                tracing::warn!(
                    %job_id, %job_type,
                    attempt = entry.attempts,
                    %error_msg,
                    backoff_secs,
                    "job failed, scheduling retry"
                );
            } else {
                entry.finish(JobStatus::Failed);
                tracing::error!(
                    %job_id, %job_type,
                    attempts = entry.attempts,
                    %error_msg,
                    "job permanently failed"
                );
            }
        }
    }
    write_back(queue, &entry).await;
}

async fn write_back(queue: &Arc<dyn QueueProvider>, entry: &JobEntry) {
    if let Err(e) = queue.update(entry).await {
        tracing::error!(job_id = %entry.id, error = %e, "failed to store job state");
    }
}
