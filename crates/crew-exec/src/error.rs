use crew_core::CrewError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    /// Caller input rejected before anything was sent.
    #[error(transparent)]
    Invalid(#[from] CrewError),

    #[error("target '{0}' is not registered with the execution channel")]
    TargetNotRegistered(String),

    #[error("invalid target '{0}'")]
    InvalidTarget(String),

    #[error("target '{target}' runs unsupported platform '{platform}'")]
    UnsupportedPlatform { target: String, platform: String },

    /// The channel or a lifecycle hook refused the request; carries its raw text.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("process error: {0}")]
    Process(String),
}

impl ExecError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ExecError::Invalid(e) if e.is_validation())
    }
}
