use thiserror::Error;

use shared_models::error::AppError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppointmentError {
    /// Malformed input; surfaced verbatim and never retried.
    #[error("{0}")]
    Validation(String),

    /// Soft overlap without an override. The caller may retry with override set.
    #[error("{}", conflict_message(*count))]
    Conflict { count: usize },

    /// Hard rule violation; never overridable.
    #[error("{0}")]
    Logical(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppointmentError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppointmentError::Validation(message.into())
    }

    pub fn logical(message: impl Into<String>) -> Self {
        AppointmentError::Logical(message.into())
    }

    pub fn appointment_not_found() -> Self {
        AppointmentError::NotFound("Appointment".to_string())
    }
}

pub fn conflict_message(count: usize) -> String {
    if count == 1 {
        "1 existing appointment overlaps with this one".to_string()
    } else {
        format!("{} existing appointments overlap with this one", count)
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let message = err.to_string();
        match err {
            AppointmentError::Validation(_) => AppError::ValidationError(message),
            AppointmentError::Conflict { .. } => AppError::Conflict(message),
            AppointmentError::Logical(_) => AppError::RuleViolation(message),
            AppointmentError::NotFound(_) => AppError::NotFound(message),
            AppointmentError::Storage(_) => AppError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_pluralizes() {
        assert_eq!(
            AppointmentError::Conflict { count: 1 }.to_string(),
            "1 existing appointment overlaps with this one"
        );
        assert_eq!(
            AppointmentError::Conflict { count: 2 }.to_string(),
            "2 existing appointments overlap with this one"
        );
    }

    #[test]
    fn test_transport_mapping() {
        assert!(matches!(AppError::from(AppointmentError::Conflict { count: 3 }), AppError::Conflict(_)));
        assert!(matches!(AppError::from(AppointmentError::logical("no")), AppError::RuleViolation(_)));
        assert!(matches!(AppError::from(AppointmentError::appointment_not_found()), AppError::NotFound(_)));
    }
}
