//! Storage error codes and the error type surfaced to upper layers.

use thiserror::Error;

/// Azure Storage error codes surfaced by the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // General errors
    InternalError,
    InvalidInput,
    InvalidOperation,
    InvalidResourceName,
    NotImplemented,

    // Container errors
    ContainerAlreadyExists,
    ContainerNotFound,

    // Blob errors
    BlobArchived,
    BlobNotFound,
    BlobSnapshotsPresent,
    InvalidBlobType,
    SnapshotsPresent,

    // Lease errors
    InvalidLeaseBreakPeriod,
    InvalidLeaseDuration,
    LeaseAlreadyPresent,
    LeaseIdMismatch,
    LeaseIdMismatchWithBlobOperation,
    LeaseIdMismatchWithContainerOperation,
    LeaseIdMismatchWithLeaseOperation,
    LeaseIdMissing,
    LeaseIsBreakingAndCannotBeChanged,
    LeaseIsBrokenAndCannotBeRenewed,
    LeaseLost,
    LeaseNotPresent,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InternalError => "InternalError",
            ErrorCode::InvalidInput => "InvalidInput",
            ErrorCode::InvalidOperation => "InvalidOperation",
            ErrorCode::InvalidResourceName => "InvalidResourceName",
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::ContainerAlreadyExists => "ContainerAlreadyExists",
            ErrorCode::ContainerNotFound => "ContainerNotFound",
            ErrorCode::BlobArchived => "BlobArchived",
            ErrorCode::BlobNotFound => "BlobNotFound",
            ErrorCode::BlobSnapshotsPresent => "BlobSnapshotsPresent",
            ErrorCode::InvalidBlobType => "InvalidBlobType",
            ErrorCode::SnapshotsPresent => "SnapshotsPresent",
            ErrorCode::InvalidLeaseBreakPeriod => "InvalidLeaseBreakPeriod",
            ErrorCode::InvalidLeaseDuration => "InvalidLeaseDuration",
            ErrorCode::LeaseAlreadyPresent => "LeaseAlreadyPresent",
            ErrorCode::LeaseIdMismatch => "LeaseIdMismatch",
            ErrorCode::LeaseIdMismatchWithBlobOperation => "LeaseIdMismatchWithBlobOperation",
            ErrorCode::LeaseIdMismatchWithContainerOperation => {
                "LeaseIdMismatchWithContainerOperation"
            }
            ErrorCode::LeaseIdMismatchWithLeaseOperation => "LeaseIdMismatchWithLeaseOperation",
            ErrorCode::LeaseIdMissing => "LeaseIdMissing",
            ErrorCode::LeaseIsBreakingAndCannotBeChanged => "LeaseIsBreakingAndCannotBeChanged",
            ErrorCode::LeaseIsBrokenAndCannotBeRenewed => "LeaseIsBrokenAndCannotBeRenewed",
            ErrorCode::LeaseLost => "LeaseLost",
            ErrorCode::LeaseNotPresent => "LeaseNotPresent",
        }
    }

    /// Returns the HTTP status code upper layers map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidInput
            | ErrorCode::InvalidOperation
            | ErrorCode::InvalidResourceName
            | ErrorCode::InvalidBlobType
            | ErrorCode::InvalidLeaseBreakPeriod
            | ErrorCode::InvalidLeaseDuration => 400,

            ErrorCode::BlobNotFound | ErrorCode::ContainerNotFound => 404,

            ErrorCode::BlobArchived
            | ErrorCode::BlobSnapshotsPresent
            | ErrorCode::SnapshotsPresent
            | ErrorCode::ContainerAlreadyExists
            | ErrorCode::LeaseAlreadyPresent
            | ErrorCode::LeaseIdMismatch
            | ErrorCode::LeaseIdMismatchWithBlobOperation
            | ErrorCode::LeaseIdMismatchWithContainerOperation
            | ErrorCode::LeaseIdMismatchWithLeaseOperation
            | ErrorCode::LeaseIsBreakingAndCannotBeChanged
            | ErrorCode::LeaseIsBrokenAndCannotBeRenewed
            | ErrorCode::LeaseNotPresent => 409,

            ErrorCode::LeaseIdMissing | ErrorCode::LeaseLost => 412,

            ErrorCode::NotImplemented => 501,

            ErrorCode::InternalError => 500,
        }
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ContainerAlreadyExists => "The specified container already exists.",
            ErrorCode::ContainerNotFound => "The specified container does not exist.",
            ErrorCode::BlobNotFound => "The specified blob does not exist.",
            ErrorCode::BlobArchived => "This operation is not permitted on an archived blob.",
            ErrorCode::SnapshotsPresent => {
                "This operation is not permitted because the blob has snapshots."
            }
            ErrorCode::BlobSnapshotsPresent => {
                "This operation is not permitted on a blob snapshot."
            }
            ErrorCode::InvalidLeaseDuration => "The lease duration is not valid.",
            ErrorCode::InvalidLeaseBreakPeriod => "The lease break period is not valid.",
            ErrorCode::LeaseAlreadyPresent => "There is already a lease present.",
            ErrorCode::LeaseNotPresent => "There is currently no lease on the resource.",
            ErrorCode::LeaseIdMissing => {
                "There is currently a lease on the resource and no lease ID was specified in the request."
            }
            ErrorCode::LeaseLost => {
                "A lease ID was specified, but the lease for the resource has expired."
            }
            ErrorCode::LeaseIsBrokenAndCannotBeRenewed => {
                "The lease ID matched, but the lease has been broken explicitly and cannot be renewed."
            }
            ErrorCode::LeaseIsBreakingAndCannotBeChanged => {
                "The lease ID matched, but the lease is currently in breaking state and cannot be changed."
            }
            ErrorCode::NotImplemented => "The requested operation is not implemented.",
            ErrorCode::InternalError => {
                "The server encountered an internal error. Please retry the request."
            }
            _ => "An error occurred while processing the request.",
        }
    }
}

/// Storage error with code, message, and request correlation id.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct StorageError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
}

impl StorageError {
    /// Creates a new storage error with the given code and default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.default_message().to_string(),
            code,
            request_id: None,
        }
    }

    /// Creates a new storage error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: None,
        }
    }

    /// Sets the request ID for this error.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::with_message(ErrorCode::InternalError, err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::with_message(
            ErrorCode::InternalError,
            format!("failed to decode persisted value: {err}"),
        )
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
