//! Service error type and its HTTP rendering

use crate::metadata::StoreError;
use crate::service::principal::PrincipalError;
use crate::storage::StorageError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors reported to the caller of a service operation
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Failed to parse user ID: {0}")]
    InvalidPrincipal(#[from] PrincipalError),

    #[error("{0}")]
    NotFound(String),

    #[error("error uploading file to storage: {0}")]
    Transfer(#[source] StorageError),

    #[error("upload to storage did not finish within {}s", .0.as_secs())]
    TransferTimeout(Duration),

    #[error("error saving file metadata: {0}")]
    Persist(#[source] StoreError),

    #[error("failed to {context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("cached {key} is corrupt: {source}")]
    CorruptCache {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Wrap a record-store read failure with the operation it interrupted
    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| ServiceError::Store { context, source }
    }

    /// Whether the failure is the caller's fault
    pub fn is_client_fault(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidPrincipal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Transfer(_) => StatusCode::BAD_GATEWAY,
            ServiceError::TransferTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Store { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::CorruptCache { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
