//! Single place where upstream failures become user-facing messages.

use crate::error::ExecError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    /// The target exists but cannot take commands yet.
    NotReady,
    /// The target id is unknown, invalid or terminated.
    InvalidTarget,
    UnsupportedPlatform,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UpstreamFailure {
    pub kind: UpstreamKind,
    pub message: String,
}

const MSG_NOT_READY: &str =
    "Instance is not ready to accept commands yet. Wait a minute and try again.";
const MSG_INVALID_TARGET: &str = "Instance not found or already terminated.";
const MSG_UNSUPPORTED: &str = "Instance platform does not support remote commands.";
const MSG_GENERIC: &str = "Remote execution failed. Try again later.";

impl UpstreamFailure {
    pub fn new(kind: UpstreamKind) -> Self {
        let message = match kind {
            UpstreamKind::NotReady => MSG_NOT_READY,
            UpstreamKind::InvalidTarget => MSG_INVALID_TARGET,
            UpstreamKind::UnsupportedPlatform => MSG_UNSUPPORTED,
            UpstreamKind::Generic => MSG_GENERIC,
        };
        Self {
            kind,
            message: message.to_string(),
        }
    }

    /// A generic failure with a caller-safe message.
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamKind::Generic,
            message: message.into(),
        }
    }

    pub fn is_not_ready(&self) -> bool {
        self.kind == UpstreamKind::NotReady
    }
}

/// Classify free-form upstream error text.
pub fn classify_message(text: &str) -> UpstreamFailure {
    let lower = text.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    let kind = if has(&["unsupported platform", "invalid platform", "invalidplatform"]) {
        UpstreamKind::UnsupportedPlatform
    } else if has(&[
        "not registered",
        "not ready",
        "connection refused",
        "no route to host",
        "connection timed out",
        "is pending",
    ]) {
        UpstreamKind::NotReady
    } else if has(&[
        "invalid target",
        "invalid instance",
        "invalidinstanceid",
        "not found",
        "does not exist",
        "terminated",
        "could not resolve hostname",
    ]) {
        UpstreamKind::InvalidTarget
    } else {
        UpstreamKind::Generic
    };
    UpstreamFailure::new(kind)
}

/// Classify a channel error. Validation errors are not upstream failures.
pub fn classify(err: &ExecError) -> Option<UpstreamFailure> {
    let failure = match err {
        ExecError::Invalid(_) => return None,
        ExecError::TargetNotRegistered(_) => UpstreamFailure::new(UpstreamKind::NotReady),
        ExecError::InvalidTarget(_) => UpstreamFailure::new(UpstreamKind::InvalidTarget),
        ExecError::UnsupportedPlatform { .. } => {
            UpstreamFailure::new(UpstreamKind::UnsupportedPlatform)
        }
        ExecError::Rejected(text) => classify_message(text),
        ExecError::Io(_) | ExecError::Process(_) => UpstreamFailure::new(UpstreamKind::Generic),
    };
    Some(failure)
}
