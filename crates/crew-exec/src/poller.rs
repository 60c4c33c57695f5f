use std::sync::Arc;
use std::time::Duration;

use crew_core::config::ExecConfig;
use tokio::time::Instant;
use tracing::debug;

use crate::channel::ExecChannel;
use crate::types::PollResult;
use crate::Result;

/// Outcome of a bounded wait.
#[derive(Debug, Clone, PartialEq)]
pub enum FastPoll {
    Done(PollResult),
    /// Budget exhausted; carries the last snapshot. Poll again later.
    StillRunning(PollResult),
}

impl FastPoll {
    pub fn is_done(&self) -> bool {
        matches!(self, FastPoll::Done(_))
    }

    pub fn into_result(self) -> PollResult {
        match self {
            FastPoll::Done(r) | FastPoll::StillRunning(r) => r,
        }
    }
}

/// Reads invocation state, once or in a bounded loop.
#[derive(Clone)]
pub struct Poller {
    channel: Arc<dyn ExecChannel>,
    interval: Duration,
    attempts: u32,
}

impl Poller {
    pub fn new(channel: Arc<dyn ExecChannel>, exec: &ExecConfig) -> Self {
        Self {
            channel,
            interval: Duration::from_millis(exec.poll_interval_ms),
            attempts: exec.fast_poll_attempts,
        }
    }

    /// Single poll. An unknown command id yields `found = false`.
    pub async fn poll(&self, target: &str, command_id: &str) -> Result<PollResult> {
        Ok(self
            .channel
            .get_invocation(command_id, target)
            .await?
            .map(PollResult::from)
            .unwrap_or_else(PollResult::not_found))
    }

    /// Poll every interval, up to the attempt budget, until terminal.
    pub async fn fast_poll(&self, target: &str, command_id: &str) -> Result<FastPoll> {
        let mut last = PollResult::not_found();
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.interval).await;
            last = self.poll(target, command_id).await?;
            if last.done() {
                debug!(command_id = %command_id, attempt, status = %last.status, "fast poll done");
                return Ok(FastPoll::Done(last));
            }
        }
        Ok(FastPoll::StillRunning(last))
    }

    /// Poll every interval until terminal or until `max_wait` has elapsed.
    pub async fn wait(&self, target: &str, command_id: &str, max_wait: Duration) -> Result<FastPoll> {
        let deadline = Instant::now() + max_wait;
        loop {
            tokio::time::sleep(self.interval).await;
            let last = self.poll(target, command_id).await?;
            if last.done() {
                return Ok(FastPoll::Done(last));
            }
            if Instant::now() >= deadline {
                return Ok(FastPoll::StillRunning(last));
            }
        }
    }
}
