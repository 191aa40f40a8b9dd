//! Local cloud error types

use fleetform_core::TaskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalCloudError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LocalCloudError>;

impl From<LocalCloudError> for TaskError {
    fn from(err: LocalCloudError) -> Self {
        match err {
            LocalCloudError::AccessDenied(msg) => TaskError::PermissionDenied(msg),
            LocalCloudError::Unavailable(msg) => TaskError::Query(msg),
            LocalCloudError::WriteRejected(msg) => TaskError::Mutation(msg),
            LocalCloudError::InvalidResource(msg) => TaskError::Invalid(msg),
            LocalCloudError::Json(e) => TaskError::Json(e),
            other => TaskError::Other(other.into()),
        }
    }
}
