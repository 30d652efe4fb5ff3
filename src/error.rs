use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

pub type AppResult<T> = Result<T, ChatError>;

/// Everything the chat endpoints can fail with.
///
/// `Transport` never crosses an API boundary to the sender of a message; a
/// dead subscriber is logged and skipped so the rest of the room still gets
/// the broadcast.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("message store failed: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("live channel lost: {0}")]
    Transport(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<tower_sessions::session::Error> for ChatError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(anyhow::Error::from(err))
    }
}

impl From<uuid::Error> for ChatError {
    fn from(err: uuid::Error) -> Self {
        Self::Internal(anyhow::Error::from(err))
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ChatError::Persistence(_) | ChatError::Transport(_) | ChatError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
