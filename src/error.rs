use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dto::protocol::ProtocolError,
    services::{
        admin_service::AdminError, display_service::DisplayError, fff_service::FffError,
        game_engine::EngineError, mobile_service::BallotError,
    },
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A background task the operation relies on is gone.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// Fixtures failed to load and no game is running.
    #[error("fixtures unavailable (degraded mode)")]
    Degraded,
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Unexpected failure inside the server.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(message) => AppError::ServiceUnavailable(message),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownUser(_) => ServiceError::NotFound(err.to_string()),
            EngineError::OptionUnavailable(_) => ServiceError::InvalidInput(err.to_string()),
            other => ServiceError::InvalidState(other.to_string()),
        }
    }
}

impl From<DisplayError> for ServiceError {
    fn from(err: DisplayError) -> Self {
        match err {
            DisplayError::Engine(engine) => engine.into(),
            DisplayError::Stopped => ServiceError::Unavailable(err.to_string()),
        }
    }
}

impl From<FffError> for ServiceError {
    fn from(err: FffError) -> Self {
        match err {
            FffError::NoQuestion => ServiceError::NotFound(err.to_string()),
            FffError::Stopped => ServiceError::Unavailable(err.to_string()),
            FffError::RoundActive | FffError::RoundInactive | FffError::DuplicateSubmission(_) => {
                ServiceError::InvalidState(err.to_string())
            }
        }
    }
}

impl From<AdminError> for ServiceError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::UnknownUser(_) | AdminError::UnknownQuestion(_) => {
                ServiceError::NotFound(err.to_string())
            }
            AdminError::NoUserSelected | AdminError::StalePoll { .. } => {
                ServiceError::InvalidState(err.to_string())
            }
            AdminError::Protocol(protocol) => protocol.into(),
        }
    }
}

impl From<BallotError> for ServiceError {
    fn from(err: BallotError) -> Self {
        match err {
            BallotError::NotOpened => ServiceError::InvalidInput(err.to_string()),
            BallotError::Expired | BallotError::AlreadyVoted => {
                ServiceError::InvalidState(err.to_string())
            }
        }
    }
}

impl From<ProtocolError> for ServiceError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Malformed { .. } => ServiceError::InvalidInput(err.to_string()),
            ProtocolError::Serialize { .. } => ServiceError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::Lifeline;

    fn status_of(err: impl Into<ServiceError>) -> StatusCode {
        AppError::from(err.into()).into_response().status()
    }

    #[test]
    fn domain_errors_map_to_http_statuses() {
        assert_eq!(status_of(EngineError::UnknownUser(9)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(EngineError::LifelineUnavailable(Lifeline::FiftyFifty)),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(FffError::Stopped), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(BallotError::AlreadyVoted), StatusCode::CONFLICT);
        assert_eq!(status_of(BallotError::NotOpened), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(AdminError::StalePoll {
                viewed: Some(2),
                live: Some(3)
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::Degraded),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
