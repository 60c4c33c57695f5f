use std::sync::Arc;

use crew_core::config::ExecConfig;
use crew_core::script::Script;
use crew_core::CrewError;
use tracing::info;

use crate::channel::ExecChannel;
use crate::types::SendRequest;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub working_directory: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Submits commands to exactly one target and hands back the command id.
#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn ExecChannel>,
    max_command_chars: usize,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn ExecChannel>, exec: &ExecConfig) -> Self {
        Self {
            channel,
            max_command_chars: exec.max_command_chars,
        }
    }

    pub fn max_command_chars(&self) -> usize {
        self.max_command_chars
    }

    /// Interactive command text must be non-empty and within the length cap.
    pub fn validate_interactive(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(CrewError::InvalidCommand("command is required".into()).into());
        }
        let len = text.chars().count();
        if len > self.max_command_chars {
            return Err(CrewError::CommandTooLong {
                len,
                limit: self.max_command_chars,
            }
            .into());
        }
        Ok(())
    }

    /// Submit a free-text command typed by a user.
    pub async fn submit(&self, target: &str, text: &str, opts: SubmitOptions) -> Result<String> {
        self.validate_interactive(text)?;
        self.send(target, vec![text.to_string()], opts).await
    }

    /// Submit a composed script. No length cap beyond what the channel enforces.
    pub async fn submit_script(
        &self,
        target: &str,
        script: Script,
        opts: SubmitOptions,
    ) -> Result<String> {
        if script.commands().is_empty() {
            return Err(CrewError::InvalidCommand("empty script".into()).into());
        }
        self.send(target, script.into_commands(), opts).await
    }

    async fn send(
        &self,
        target: &str,
        commands: Vec<String>,
        opts: SubmitOptions,
    ) -> Result<String> {
        let lines = commands.len();
        let req = SendRequest {
            commands,
            working_directory: opts.working_directory,
            timeout_secs: opts.timeout_secs,
        };
        let command_id = self.channel.send(target, req).await?;
        info!(target_id = %target, command_id = %command_id, lines, "command submitted");
        Ok(command_id)
    }
}
