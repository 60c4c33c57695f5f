use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crew_core::error::CrewError;
use crew_exec::{classify, ExecError, UpstreamFailure, UpstreamKind};

// ---------------------------------------------------------------------------
// Internal sentinel for explicit status codes
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 401 through the `anyhow::Error` chain.
#[derive(Debug)]
struct UnauthorizedError(String);

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnauthorizedError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(CrewError::InvalidRequest(msg.into()).into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(UnauthorizedError(msg.into()).into())
    }
}

fn crew_status(e: &CrewError) -> StatusCode {
    match e {
        CrewError::InstanceNotFound(_)
        | CrewError::CronJobNotFound(_)
        | CrewError::FileNotFound(_) => StatusCode::NOT_FOUND,
        CrewError::SystemCronJob(_) | CrewError::ConcurrentModification(_) => StatusCode::CONFLICT,
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
        | CrewError::InstanceTerminated(_) => StatusCode::BAD_REQUEST,
        CrewError::ConfigNotFound(_)
        | CrewError::InvalidConfig(_)
        | CrewError::InvalidSelfReport(_)
        | CrewError::Io(_)
        | CrewError::Yaml(_)
        | CrewError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn upstream_status(f: &UpstreamFailure) -> StatusCode {
    match f.kind {
        UpstreamKind::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        UpstreamKind::InvalidTarget | UpstreamKind::UnsupportedPlatform | UpstreamKind::Generic => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn json_error(status: StatusCode, message: String) -> Response {
    let body = serde_json::json!({ "error": message });
    (status, axum::Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(u) = self.0.downcast_ref::<UnauthorizedError>() {
            return json_error(StatusCode::UNAUTHORIZED, u.0.clone());
        }

        if let Some(f) = self.0.downcast_ref::<UpstreamFailure>() {
            return json_error(upstream_status(f), f.message.clone());
        }

        if let Some(e) = self.0.downcast_ref::<ExecError>() {
            if let ExecError::Invalid(inner) = e {
                let status = crew_status(inner);
                if status != StatusCode::INTERNAL_SERVER_ERROR {
                    return json_error(status, inner.to_string());
                }
            } else if let Some(f) = classify(e) {
                tracing::warn!(error = %e, kind = ?f.kind, "upstream failure");
                return json_error(upstream_status(&f), f.message);
            }
        }

        if let Some(e) = self.0.downcast_ref::<CrewError>() {
            let status = crew_status(e);
            if status != StatusCode::INTERNAL_SERVER_ERROR {
                return json_error(status, e.to_string());
            }
        }

        tracing::error!("unhandled error: {:#}", self.0);
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
