use thiserror::Error;

use appointment_cell::services::store::StoreError;
use shared_models::error::AppError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BillingError {
    /// Malformed money or billing input. The message names the offending field.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Logical(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub fn logical(message: impl Into<String>) -> Self {
        BillingError::Logical(message.into())
    }

    pub fn invoice_not_found() -> Self {
        BillingError::NotFound("Invoice".to_string())
    }
}

impl From<StoreError> for BillingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(entity) => BillingError::NotFound(entity),
            other => BillingError::Storage(other.to_string()),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        let message = err.to_string();
        match err {
            BillingError::Validation(_) => AppError::ValidationError(message),
            BillingError::Logical(_) => AppError::RuleViolation(message),
            BillingError::NotFound(_) => AppError::NotFound(message),
            BillingError::Storage(_) => AppError::Internal(message),
        }
    }
}
