use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrewError {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("instance {0} is terminated")]
    InstanceTerminated(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("command exceeds the {limit} character limit ({len} characters)")]
    CommandTooLong { len: usize, limit: usize },

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid cron schedule '{0}': expected 5 fields of *, */N or a comma/range list of integers")]
    InvalidCronSchedule(String),

    #[error("invalid cron job: {0}")]
    InvalidCronJob(String),

    #[error("cron job not found: {0}")]
    CronJobNotFound(String),

    #[error("refusing to remove system cron job '{0}' without force")]
    SystemCronJob(String),

    #[error("invalid reset request: {0}")]
    InvalidResetPlan(String),

    #[error("invalid skill name '{0}': only letters, digits, '_', '-' and '/' are allowed")]
    InvalidSkillName(String),

    #[error("invalid path '{0}': must resolve inside the agent root")]
    InvalidPath(String),

    #[error("file too large: {len} bytes (limit {limit})")]
    FileTooLarge { len: usize, limit: usize },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("remote state changed concurrently: {0}")]
    ConcurrentModification(String),

    #[error("invalid self-report: {0}")]
    InvalidSelfReport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CrewError {
    /// True for errors caused by caller input rather than by the system.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CrewError::InvalidRequest(_)
                | CrewError::InvalidCommand(_)
                | CrewError::CommandTooLong { .. }
                | CrewError::InvalidAction(_)
                | CrewError::InvalidCronSchedule(_)
                | CrewError::InvalidCronJob(_)
                | CrewError::InvalidSkillName(_)
                | CrewError::InvalidResetPlan(_)
                | CrewError::InvalidPath(_)
                | CrewError::FileTooLarge { .. }
                | CrewError::InstanceTerminated(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CrewError>;
