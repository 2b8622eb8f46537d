use studio_types::api::ErrorBody;

/// Fallback shown when a failed attempt carries no server message.
pub const GENERIC_FAILURE: &str = "Failed to generate image";

/// Why a single generation attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttemptError {
    /// The server answered with a non-success status.
    #[error("server responded {status}: {}", .body.as_ref().map(|b| b.error.to_message()).unwrap_or_default())]
    Rejected { status: u16, body: Option<ErrorBody> },

    /// The request never produced a response (connect, timeout, decode).
    #[error("request failed: {0}")]
    Transport(String),
}

impl AttemptError {
    pub fn rejected(status: u16, body: Option<ErrorBody>) -> Self {
        Self::Rejected { status, body }
    }

    /// Only an explicit `retryable: true` from the server makes an attempt
    /// worth repeating. The status code alone is never enough.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                body: Some(ErrorBody { retryable: Some(true), .. }),
                ..
            }
        )
    }

    /// Message to surface to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { body: Some(body), .. } => {
                let message = body.error.to_message();
                if message.is_empty() {
                    GENERIC_FAILURE.to_string()
                } else {
                    message
                }
            }
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

/// Errors from the non-generation endpoints (auth, history).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message} ({status})")]
    Api { status: u16, message: String },
}
