//! Acompanhamento de um job remoto até um status terminal.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::error::SoraError;
use crate::openai::{JobStatus, VideoApi, VideoRecord};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    /// Wall-clock deadline for this job id; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl PollOptions {
    /// From CLI/config seconds. Both values must be finite and > 0.
    pub fn from_secs(interval: f64, timeout: Option<f64>) -> Result<Self, SoraError> {
        let interval = positive_secs("--poll-interval", interval)?;
        let timeout = timeout
            .map(|t| positive_secs("--timeout", t))
            .transpose()?;
        Ok(Self { interval, timeout })
    }
}

fn positive_secs(flag: &str, secs: f64) -> Result<Duration, SoraError> {
    if secs.is_nan() || secs <= 0.0 {
        return Err(SoraError::InvalidOption(format!("{flag} must be > 0")));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| SoraError::InvalidOption(format!("{flag} is too large: {secs}")))
}

/// Retrieves `id` until its status is terminal.
///
/// `on_change` fires only when the observed status differs from the
/// previous one. Sleeps never overshoot the deadline.
pub async fn poll<C, F>(
    api: &C,
    id: &str,
    options: &PollOptions,
    mut on_change: F,
) -> Result<VideoRecord, SoraError>
where
    C: VideoApi,
    F: FnMut(JobStatus),
{
    let started = Instant::now();
    let mut last: Option<JobStatus> = None;

    loop {
        let record = api.retrieve(id).await?;
        let status = record.status();
        if last != Some(status) {
            info!(id, %status, "status");
            on_change(status);
            last = Some(status);
        } else {
            debug!(id, %status, "unchanged");
        }
        if status.is_terminal() {
            return Ok(record);
        }

        let mut wait = options.interval;
        if let Some(timeout) = options.timeout {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(SoraError::PollTimeout {
                    id: id.to_string(),
                    timeout,
                });
            }
            wait = wait.min(timeout - elapsed);
        }
        sleep(wait).await;
    }
}
