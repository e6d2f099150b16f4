use crate::db::errors::DbError;
use crate::documents::ConversionError;
use crate::payments::{PaymentError, ReconcileError};
use crate::pricing::PageUnits;
use crate::settlement::SettlementError;
use crate::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// The balance does not cover the requested charge
    #[error("Insufficient balance: {required} page units required, {available} available")]
    InsufficientBalance { required: PageUnits, available: PageUnits },

    /// Well-formed request that cannot be carried out on the given input
    #[error("{message}")]
    Unprocessable { message: String },

    /// Conflict error, e.g. acting on an entity in the wrong state
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            Error::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for the `error` field of the response body
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthenticated { .. } => "unauthenticated",
            Error::BadRequest { .. } => "bad_request",
            Error::NotFound { .. } => "not_found",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::Unprocessable { .. } => "unprocessable",
            Error::Conflict { .. } => "conflict",
            Error::Database(DbError::UniqueViolation { .. }) => "conflict",
            Error::Database(DbError::NotFound) => "not_found",
            Error::Database(DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. }) => "bad_request",
            Error::Internal { .. } | Error::Database(DbError::Other(_)) | Error::Other(_) => "internal",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::BadRequest { message } | Error::Unprocessable { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::InsufficientBalance { .. } => "Insufficient page balance. Top up your wallet to continue printing.".to_string(),
            Error::Conflict { message } => message.clone(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, .. } => match constraint.as_deref() {
                    Some("transactions_reference_unique") => "This payment reference is already in use".to_string(),
                    Some("transactions_gateway_transaction_id_unique") => {
                        "This gateway transaction has already been applied".to_string()
                    }
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) | Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authentication error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::Unprocessable { .. } | Error::InsufficientBalance { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let mut body = json!({
            "error": self.code(),
            "message": self.user_message(),
        });
        if let Error::InsufficientBalance { required, available } = &self {
            body["required"] = json!(required);
            body["available"] = json!(available);
        }

        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => Error::NotFound {
                resource: entity.to_string(),
                id,
            },
            StorageError::InsufficientBalance { required, available } => Error::InsufficientBalance { required, available },
            err @ StorageError::InvalidTransition { .. } => Error::Conflict { message: err.to_string() },
            StorageError::Conflict(message) => Error::Conflict { message },
            StorageError::Database(db_err) => Error::Database(db_err),
        }
    }
}

impl From<SettlementError> for Error {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::InvalidRequest(message) => Error::BadRequest { message },
            err @ SettlementError::InvalidRange { .. } => Error::BadRequest { message: err.to_string() },
            SettlementError::DocumentNotFound(id) => Error::NotFound {
                resource: "Document".to_string(),
                id: id.to_string(),
            },
            // Server-side faults: the upload vanished or no scratch space
            SettlementError::ConversionFailed(err @ (ConversionError::SourceUnreadable { .. } | ConversionError::Workdir(_))) => {
                Error::Internal {
                    operation: format!("prepare document for conversion: {err}"),
                }
            }
            SettlementError::ConversionFailed(err @ ConversionError::Exhausted { .. }) => {
                tracing::warn!("Document conversion failed: {}", err);
                Error::Unprocessable {
                    message: "Document could not be converted to PDF".to_string(),
                }
            }
            SettlementError::PageCountUnavailable(err) => {
                tracing::warn!("Page count unavailable: {}", err);
                Error::Unprocessable {
                    message: "Document page count unavailable".to_string(),
                }
            }
            SettlementError::InsufficientBalance { required, available } => Error::InsufficientBalance { required, available },
            SettlementError::Persist(e) => Error::Internal {
                operation: format!("persist normalized document: {e}"),
            },
            SettlementError::Storage(e) => e.into(),
        }
    }
}

impl From<ReconcileError> for Error {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Unauthorized => Error::Unauthenticated {
                message: Some("Invalid webhook credentials".to_string()),
            },
            err @ ReconcileError::MalformedPayload(_) => Error::BadRequest { message: err.to_string() },
            ReconcileError::Storage(e) => e.into(),
        }
    }
}

impl From<PaymentError> for Error {
    fn from(err: PaymentError) -> Self {
        match err {
            err @ (PaymentError::InvalidPages(_) | PaymentError::AmountOverflow(_)) => Error::BadRequest { message: err.to_string() },
            PaymentError::ReferenceExhausted => Error::Internal {
                operation: "allocate a payment reference".to_string(),
            },
            PaymentError::Storage(e) => e.into(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
