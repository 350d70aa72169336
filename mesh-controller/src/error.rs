//! Function Mesh controller error abstractions.

use tonic::Status;

pub use mesh_core::AppError;

/// An extension trait for the Function Mesh core `AppError`.
pub trait AppErrorExt {
    /// Get the gRPC status for this error.
    fn into_status(self) -> Status;

    /// Translate the given error as an app error and map into a gRPC status object.
    fn grpc(err: anyhow::Error) -> Status;
}

impl AppErrorExt for AppError {
    fn into_status(self) -> Status {
        match self {
            AppError::Unauthorized => Status::permission_denied(self.to_string()),
            AppError::InvalidInput(_) => Status::invalid_argument(self.to_string()),
            AppError::NotFound(_) => Status::not_found(self.to_string()),
            AppError::Conflict(_) => Status::already_exists(self.to_string()),
            AppError::Unavailable(_) => Status::unavailable(self.to_string()),
            AppError::Transient(_) => Status::aborted(self.to_string()),
            AppError::Ise(_) => Status::internal(self.to_string()),
        }
    }

    fn grpc(err: anyhow::Error) -> Status {
        err.downcast::<tonic::Status>()
            .or_else(|err| err.downcast::<Self>().map(Self::into_status))
            .unwrap_or_else(|err| Self::Ise(err).into_status())
    }
}

/// The error type used to indicate that a system shutdown is required.
#[derive(Debug, thiserror::Error)]
#[error("fatal error: {0}")]
pub struct ShutdownError(#[from] pub anyhow::Error);

/// A result type where the error is a `ShutdownError`.
pub type ShutdownResult<T> = ::std::result::Result<T, ShutdownError>;

/// A result type used by the teardown and state operations.
pub type AppResult<T> = ::std::result::Result<T, AppError>;
