pub mod config;
pub mod cron;
pub mod error;
pub mod instance;
pub mod io;
pub mod paths;
pub mod reconcile;
pub mod script;
pub mod shell;
pub mod types;

pub use error::{CrewError, Result};
