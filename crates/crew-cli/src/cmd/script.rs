use super::load_config;
use anyhow::Context;
use clap::Subcommand;
use crew_core::script::{ResetPlan, Script, ScriptComposer};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ScriptSubcommand {
    /// Print the reset script
    Reset {
        /// JSON reset plan (config, env, workspace_files, skills)
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Print the skill installation script
    InstallSkill { skill: String },

    /// Print the built-in self-report script
    Status,
}

pub fn run(config_path: &Path, subcmd: ScriptSubcommand) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let composer = ScriptComposer::new(config.remote);

    let script = match subcmd {
        ScriptSubcommand::Reset { plan } => {
            let plan = match plan {
                Some(path) => read_plan(&path)?,
                None => ResetPlan::default(),
            };
            composer.reset(&plan)?
        }
        ScriptSubcommand::InstallSkill { skill } => composer.install_skill(&skill)?,
        ScriptSubcommand::Status => composer.status_report(),
    };
    print_script(&script);
    Ok(())
}

fn read_plan(path: &Path) -> anyhow::Result<ResetPlan> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid reset plan in {}", path.display()))
}

fn print_script(script: &Script) {
    println!("{}", script.text());
}
