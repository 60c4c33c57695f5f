use crate::types::{Invocation, SendRequest};
use crate::Result;
use async_trait::async_trait;

/// A remote execution service with submit/poll semantics.
#[async_trait]
pub trait ExecChannel: Send + Sync {
    /// Submit `req` to `target` and return the command id without waiting.
    async fn send(&self, target: &str, req: SendRequest) -> Result<String>;

    /// Current state of a command, or `None` when the channel does not know
    /// it (yet).
    async fn get_invocation(&self, command_id: &str, target: &str) -> Result<Option<Invocation>>;
}
