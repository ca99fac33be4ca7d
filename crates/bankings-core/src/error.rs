use thiserror::Error;

/// Account provisioning errors.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Unauthorized: secret mismatch")]
    Unauthorized,

    #[error("Invalid currency code '{0}': expected three ASCII digits")]
    InvalidCurrency(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Non-digit character '{found}' at position {position}")]
    NonDigit { position: usize, found: char },

    #[error("Invariant violation: {0}")]
    StageViolation(String),

    #[error("Finalization scheduler saturated ({limit} tasks in flight)")]
    SchedulerSaturated { limit: usize },

    #[error("Finalization scheduler is shutting down")]
    ShuttingDown,

    #[error("Downstream notifier '{notifier}' failed: {message}")]
    Downstream { notifier: String, message: String },
}

impl ProvisioningError {
    pub fn stage_violation(expected: &str, actual: &str) -> Self {
        Self::StageViolation(format!(
            "stage order violation: expected '{}', got '{}'",
            expected, actual
        ))
    }

    pub fn downstream(notifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Downstream {
            notifier: notifier.into(),
            message: message.into(),
        }
    }
}
