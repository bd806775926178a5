//! Background delivery of queued mailables.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::mailable::{MailContent, Mailable};
use super::manager::MailManager;
use crate::jobs::{Job, JobOpts, JobRegistry, JobResult};

/// Application state that gives workers access to the mail manager.
///
/// ```ignore
/// struct AppState {
///     mail: MailManager,
///     // ...
/// }
///
/// impl HasMailManager for AppState {
///     fn mail_manager(&self) -> &MailManager {
///         &self.mail
///     }
/// }
/// ```
pub trait HasMailManager: Send + Sync + 'static {
    fn mail_manager(&self) -> &MailManager;
}

impl HasMailManager for MailManager {
    fn mail_manager(&self) -> &MailManager {
        self
    }
}

/// A mailable waiting on a queue.
///
/// The job type is the content's `MAIL_TYPE`, so each mailable type must be
/// registered with the worker:
///
/// ```ignore
/// let registry = JobRegistry::new()
///     .register_mailable::<OrderShipped>()
///     .register_mailable::<()>();
/// Worker::with_shared_context(queues.get(None)?, registry, manager.clone()).start();
/// ```
///
/// When performed, the mailable is sent now through the mailer it names,
/// or the default mailer.
#[derive(Serialize, Deserialize)]
pub struct QueuedMailableJob<C, S = MailManager> {
    pub mailable: Mailable<C>,
    #[serde(skip)]
    _context: PhantomData<fn() -> S>,
}

impl<C: MailContent, S> QueuedMailableJob<C, S> {
    pub fn new(mailable: Mailable<C>) -> Self {
        Self {
            mailable,
            _context: PhantomData,
        }
    }

    pub fn into_mailable(self) -> Mailable<C> {
        self.mailable
    }
}

#[async_trait]
impl<C: MailContent, S: HasMailManager> Job for QueuedMailableJob<C, S> {
    const JOB_TYPE: &'static str = C::MAIL_TYPE;
    type Context = S;

    fn default_opts() -> JobOpts {
        JobOpts::default().max_attempts(3)
    }

    async fn perform(self, ctx: &S) -> JobResult {
        let mailer = ctx
            .mail_manager()
            .mailer(self.mailable.mailer.as_deref())?;

        match mailer.send_now(&self.mailable).await? {
            Some(sent) => Ok(Some(serde_json::to_value(sent)?)),
            None => Ok(None),
        }
    }
}

impl<S: HasMailManager> JobRegistry<S> {
    /// Handle queued mailables of content type `C`.
    pub fn register_mailable<C: MailContent>(self) -> Self {
        self.register::<QueuedMailableJob<C, S>>()
    }
}
