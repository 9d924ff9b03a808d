use thiserror::Error;

use crate::validation::ValidationError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BillingError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    #[error("Invalid fee percentage: {0}")]
    InvalidFee(String),

    #[error("Rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

pub type BillingResult<T> = Result<T, BillingError>;

impl BillingError {
    /// Availability failures can be retried by the caller; input errors cannot.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::RateUnavailable(_) | BillingError::BackendUnavailable(_)
        )
    }

    /// Short machine-readable kind, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::InvalidAmount(_) => "invalid_amount",
            BillingError::InvalidRate(_) => "invalid_rate",
            BillingError::InvalidFee(_) => "invalid_fee",
            BillingError::RateUnavailable(_) => "rate_unavailable",
            BillingError::BackendUnavailable(_) => "backend_unavailable",
            BillingError::InvalidTransition(_) => "invalid_transition",
            BillingError::NotFound(_) => "not_found",
            BillingError::PermissionDenied(_) => "permission_denied",
            BillingError::Validation(_) => "validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_errors_are_retryable() {
        assert!(BillingError::RateUnavailable("timeout".to_string()).is_retryable());
        assert!(BillingError::BackendUnavailable("503".to_string()).is_retryable());
    }

    #[test]
    fn test_input_errors_are_not_retryable() {
        assert!(!BillingError::InvalidAmount("0".to_string()).is_retryable());
        assert!(!BillingError::InvalidRate("missing".to_string()).is_retryable());
        assert!(!BillingError::InvalidFee("1.5".to_string()).is_retryable());
    }

    #[test]
    fn test_error_kind() {
        let error = BillingError::RateUnavailable("connection refused".to_string());
        assert_eq!(error.kind(), "rate_unavailable");
        assert_eq!(error.to_string(), "Rate unavailable: connection refused");
    }

    #[test]
    fn test_permission_denied_is_its_own_kind() {
        let error = BillingError::PermissionDenied("user 7 may not refund".to_string());
        assert_eq!(error.kind(), "permission_denied");
        assert!(!error.is_retryable());
        assert_eq!(error.to_string(), "Permission denied: user 7 may not refund");
    }

    #[test]
    fn test_validation_error_conversion() {
        let error: BillingError = ValidationError::new("device_id", "must not be empty").into();
        assert_eq!(error.kind(), "validation");
        assert_eq!(error.to_string(), "Validation error: device_id: must not be empty");
    }
}
