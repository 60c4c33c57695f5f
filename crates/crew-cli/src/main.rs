mod cmd;
mod config_path;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, cron::CronSubcommand, script::ScriptSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "crew",
    about = "Control plane for remote agent instances",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest crew.yaml)
    #[arg(long, global = true, env = "CREW_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP control plane
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run a command on a configured target and wait for it
    Exec {
        /// Target id from the config file
        target: String,
        /// Shell command text
        command: String,
        /// Directory to run in
        #[arg(long)]
        workdir: Option<String>,
        /// Execution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Inspect and validate the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Cron helpers
    Cron {
        #[command(subcommand)]
        subcommand: CronSubcommand,
    },

    /// Print composed remote scripts without running them
    Script {
        #[command(subcommand)]
        subcommand: ScriptSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = config_path::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Serve { bind } => cmd::serve::run(&config, bind),
        Commands::Exec {
            target,
            command,
            workdir,
            timeout,
        } => cmd::exec::run(&config, &target, &command, workdir, timeout, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config, subcommand, cli.json),
        Commands::Cron { subcommand } => cmd::cron::run(subcommand, cli.json),
        Commands::Script { subcommand } => cmd::script::run(&config, subcommand),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
