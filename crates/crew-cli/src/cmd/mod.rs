pub mod config;
pub mod cron;
pub mod exec;
pub mod script;
pub mod serve;

use anyhow::Context;
use crew_core::config::Config;
use std::path::Path;

pub(crate) fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load {}", path.display()))
}
