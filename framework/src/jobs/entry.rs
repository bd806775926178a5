use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Expired,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// Whether the entry will never be picked up again.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Retry, delay and expiry settings for one entry.
#[derive(Debug, Clone)]
pub struct JobOpts {
    /// Attempts allowed, the first one included.
    pub max_attempts: i32,
    pub expires_in: Option<Duration>,
    pub delay: Option<Duration>,
}

impl JobOpts {
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Default for JobOpts {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            expires_in: None,
            delay: None,
        }
    }
}

/// A job as stored by a [`QueueProvider`](super::QueueProvider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEntry {
    pub id: Uuid,
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub locked_at: Option<OffsetDateTime>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

impl JobEntry {
    pub fn new(
        queue: impl Into<String>,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        opts: &JobOpts,
    ) -> Result<Self, JobError> {
        let now = OffsetDateTime::now_utc();
        let run_at = match opts.delay {
            Some(delay) => after(now, delay)?,
            None => now,
        };
        let expires_at = opts.expires_in.map(|ttl| after(now, ttl)).transpose()?;
        Ok(Self {
            id: Uuid::new_v4(),
            queue: queue.into(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: opts.max_attempts,
            run_at,
            expires_at,
            locked_at: None,
            locked_by: None,
            last_error: None,
            result: None,
            created_at: now,
            completed_at: None,
        })
    }

    pub(crate) fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.locked_at = None;
        self.locked_by = None;
        self.completed_at = Some(OffsetDateTime::now_utc());
    }
}

fn after(now: OffsetDateTime, span: Duration) -> Result<OffsetDateTime, JobError> {
    time::Duration::try_from(span)
        .ok()
        .and_then(|span| now.checked_add(span))
        .ok_or_else(|| JobError::Other(format!("{span:?} from now is out of range")))
}
