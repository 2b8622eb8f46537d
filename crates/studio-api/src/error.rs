use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use studio_types::api::{ErrorBody, ErrorDetail, ValidationIssue};

/// Every failure a handler can surface, mapped onto the status taxonomy the
/// client relies on. Only `Overloaded` carries `retryable: true`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed")]
    Validation(Vec<ValidationIssue>),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Model overloaded")]
    Overloaded,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(self) -> ErrorBody {
        match self {
            Self::Validation(issues) => ErrorBody {
                error: ErrorDetail::Issues(issues),
                retryable: None,
            },
            Self::Overloaded => ErrorBody {
                error: ErrorDetail::Message("Model overloaded".into()),
                retryable: Some(true),
            },
            Self::Internal(_) => ErrorBody {
                error: ErrorDetail::Message("Internal server error".into()),
                retryable: None,
            },
            other => ErrorBody {
                error: ErrorDetail::Message(other.to_string()),
                retryable: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(e) => error!("Unexpected error: {:#}", e),
            Self::Validation(issues) => warn!("Validation error: {:?}", issues),
            Self::Overloaded => {}
            other => warn!("Request rejected ({}): {}", status, other),
        }
        (status, Json(self.body())).into_response()
    }
}

/// Map a `spawn_blocking` join failure into a 500.
pub fn join_error(e: tokio::task::JoinError) -> ApiError {
    ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e))
}
