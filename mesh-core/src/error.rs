//! Function Mesh error abstractions.

use http::StatusCode;
use thiserror::Error;

/// Application error variants.
#[derive(Debug, Error)]
pub enum AppError {
    /// The caller is unauthorized to perform the requested action.
    #[error("client is not authorized to perform the requested operation")]
    Unauthorized,
    /// The given input was invalid.
    #[error("validation error: {0}")]
    InvalidInput(String),
    /// The target resource, key or namespace does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The target resource already exists.
    #[error("resource already exists: {0}")]
    Conflict(String),
    /// A dependency has not finished initializing, the caller should retry later.
    #[error("{0}")]
    Unavailable(String),
    /// A network or RPC hiccup which is expected to clear up on its own.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The server has hit an internal error, but will remain online.
    #[error("internal server error: {0}")]
    Ise(anyhow::Error),
}

impl AppError {
    /// Build an internal error from the given message, preserving it verbatim.
    pub fn ise<M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static>(msg: M) -> Self {
        Self::Ise(anyhow::Error::msg(msg))
    }

    /// Check if this error belongs to the class of errors which may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Get the HTTP status code corresponding to this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transient(_) | Self::Ise(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Translate the given error into an app error, wrapping unknown errors as an ISE.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        err.downcast::<Self>().unwrap_or_else(Self::Ise)
    }
}
