use super::load_config;
use crate::output::print_json;
use crew_exec::{Dispatcher, ExecChannel, Poller, ProcessChannel, SubmitOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Grace period on top of the execution timeout before the CLI stops waiting.
const WAIT_SLACK_SECS: u64 = 5;

pub fn run(
    config_path: &Path,
    target: &str,
    command: &str,
    workdir: Option<String>,
    timeout: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    if config.target(target).is_none() {
        anyhow::bail!("unknown target '{target}'");
    }

    let channel: Arc<dyn ExecChannel> = Arc::new(ProcessChannel::new(
        config.targets.clone(),
        config.exec.clone(),
    ));
    let dispatcher = Dispatcher::new(Arc::clone(&channel), &config.exec);
    let poller = Poller::new(channel, &config.exec);
    let max_wait = Duration::from_secs(
        timeout.unwrap_or(config.exec.command_timeout_secs) + WAIT_SLACK_SECS,
    );

    let rt = tokio::runtime::Runtime::new()?;
    let (command_id, outcome) = rt.block_on(async {
        let opts = SubmitOptions {
            working_directory: workdir,
            timeout_secs: timeout,
        };
        let command_id = dispatcher.submit(target, command, opts).await?;
        let outcome = poller.wait(target, &command_id, max_wait).await?;
        anyhow::Ok((command_id, outcome))
    })?;

    let done = outcome.is_done();
    let result = outcome.into_result();

    if json {
        print_json(&serde_json::json!({
            "command_id": command_id,
            "done": done,
            "status": result.status,
            "stdout": result.stdout,
            "stderr": result.stderr,
            "exit_code": result.exit_code,
        }))?;
    } else {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        std::io::stdout().flush()?;
    }

    if !done {
        anyhow::bail!(
            "command {command_id} still {} after {}s",
            result.status,
            max_wait.as_secs()
        );
    }
    if !result.succeeded() {
        match result.exit_code {
            Some(code) => anyhow::bail!("command {} with exit code {code}", result.status),
            None => anyhow::bail!("command {}", result.status),
        }
    }
    Ok(())
}

