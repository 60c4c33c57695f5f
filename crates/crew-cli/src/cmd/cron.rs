use crate::output::print_json;
use clap::Subcommand;
use crew_core::cron::NewCronJob;

#[derive(Subcommand)]
pub enum CronSubcommand {
    /// Check that a five-field schedule is accepted
    Check {
        /// Schedule, quoted as one argument (e.g. "*/5 * * * *")
        schedule: String,
    },

    /// Print the crontab lines a job would be written as
    Line {
        schedule: String,
        command: String,
        #[arg(long)]
        name: Option<String>,
    },
}

pub fn run(subcmd: CronSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CronSubcommand::Check { schedule } => check(&schedule, json),
        CronSubcommand::Line {
            schedule,
            command,
            name,
        } => line(&schedule, &command, name.as_deref(), json),
    }
}

fn check(schedule: &str, json: bool) -> anyhow::Result<()> {
    crew_core::cron::validate_schedule(schedule)?;
    if json {
        print_json(&serde_json::json!({ "schedule": schedule, "valid": true }))?;
    } else {
        println!("valid: {schedule}");
    }
    Ok(())
}

fn line(schedule: &str, command: &str, name: Option<&str>, json: bool) -> anyhow::Result<()> {
    let job = NewCronJob::new(schedule, command, name)?;
    if json {
        print_json(&serde_json::json!({
            "schedule": job.schedule,
            "command": job.command,
            "name": job.name,
            "line": job.line(),
        }))?;
        return Ok(());
    }
    if let Some(name) = &job.name {
        println!("{}{name}", crew_core::cron::NAME_PREFIX);
    }
    println!("{}", job.line());
    Ok(())
}
