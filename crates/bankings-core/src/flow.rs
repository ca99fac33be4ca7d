use crate::error::ProvisioningError;
use serde::{Serialize, Serializer};

/// Lifecycle stages of a provisioned account record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStage {
    Processing,
    Completed,
    Finalized,
}

impl AccountStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Finalized => "finalized",
        }
    }
}

/// Record status. `Finalized` carries the caller-supplied result verbatim.
///
/// Transitions only move forward: processing -> completed -> finalized. There is
/// no path from processing straight to a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountStatus {
    Processing,
    Completed,
    Finalized(String),
}

impl AccountStatus {
    pub fn stage(&self) -> AccountStage {
        match self {
            Self::Processing => AccountStage::Processing,
            Self::Completed => AccountStage::Completed,
            Self::Finalized(_) => AccountStage::Finalized,
        }
    }

    /// Wire label: the stage name, or the literal result once finalized.
    pub fn label(&self) -> &str {
        match self {
            Self::Finalized(result) => result,
            other => other.stage().name(),
        }
    }

    pub fn mark_completed(&mut self) -> Result<(), ProvisioningError> {
        self.expect(AccountStage::Processing)?;
        *self = Self::Completed;
        Ok(())
    }

    pub fn mark_finalized(&mut self, result: impl Into<String>) -> Result<(), ProvisioningError> {
        self.expect(AccountStage::Completed)?;
        *self = Self::Finalized(result.into());
        Ok(())
    }

    fn expect(&self, expected: AccountStage) -> Result<(), ProvisioningError> {
        let actual = self.stage();
        if actual != expected {
            return Err(ProvisioningError::stage_violation(
                expected.name(),
                actual.name(),
            ));
        }
        Ok(())
    }
}

impl Serialize for AccountStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Result of a guarded transition against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    IgnoredWrongState(AccountStage),
    IgnoredNotFound,
}

impl TransitionOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::IgnoredWrongState(_) => "ignored_wrong_state",
            Self::IgnoredNotFound => "ignored_not_found",
        }
    }
}
