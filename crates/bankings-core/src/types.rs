use crate::flow::AccountStatus;
use crate::number::{AccountNumber, CurrencyCode, CurrencyInput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound create request.
///
/// Field names follow the apps_accs payload (`account_id`, `application_id`,
/// `currency`); camelCase and `currency_code` spellings are accepted too.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    #[serde(default, alias = "accountId")]
    pub account_id: Option<i64>,
    #[serde(default, alias = "applicationId")]
    pub application_id: Option<i64>,
    #[serde(default, alias = "currency_code", alias = "currencyCode")]
    pub currency: Option<CurrencyInput>,
    /// Number the caller already holds, if any. Only logged.
    #[serde(default)]
    pub number: Option<i64>,
}

impl ProvisioningRequest {
    pub fn new(currency: impl Into<CurrencyInput>) -> Self {
        Self {
            currency: Some(currency.into()),
            ..Self::default()
        }
    }

    pub fn with_application(mut self, account_id: i64, application_id: i64) -> Self {
        self.account_id = Some(account_id);
        self.application_id = Some(application_id);
        self
    }

    /// Composite key when both identifiers are present.
    pub fn composite_id(&self) -> Option<String> {
        match (self.account_id, self.application_id) {
            (Some(account_id), Some(application_id)) => {
                Some(format!("{}-{}", account_id, application_id))
            }
            _ => None,
        }
    }
}

/// Inbound terminal result for a completed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultUpdate {
    pub id: String,
    pub result: String,
}

impl ResultUpdate {
    pub fn new(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: result.into(),
        }
    }
}

/// Provisioned account record held by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct AccountRecord {
    pub id: String,
    pub account_id: Option<i64>,
    pub application_id: Option<i64>,
    pub currency: CurrencyCode,
    pub account_number: AccountNumber,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Advisory only: completion is driven by the scheduler, not by this value.
    pub deadline: DateTime<Utc>,
}

impl AccountRecord {
    pub fn processing(
        id: impl Into<String>,
        request: &ProvisioningRequest,
        currency: CurrencyCode,
        account_number: AccountNumber,
        deadline: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            account_id: request.account_id,
            application_id: request.application_id,
            currency,
            account_number,
            status: AccountStatus::Processing,
            created_at: now,
            updated_at: now,
            deadline,
        }
    }

    /// Payload for the apps_accs PUT. `None` when the record lacks the
    /// identifiers the downstream route needs.
    pub fn downstream_payload(&self) -> Option<ProvisionedAccount> {
        Some(ProvisionedAccount {
            account_id: self.account_id?,
            application_id: self.application_id?,
            number: self.account_number.as_u64(),
            currency: self.currency.to_string(),
            id: self.id.clone(),
            status: self.status.label().to_string(),
        })
    }
}

/// Finalized record as delivered downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedAccount {
    pub account_id: i64,
    pub application_id: i64,
    pub number: u64,
    pub currency: String,
    pub id: String,
    pub status: String,
}

/// Synchronous answer to a create request. The number is provisional.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningReceipt {
    pub id: String,
    pub account_number: AccountNumber,
    pub status: AccountStatus,
    pub deadline: DateTime<Utc>,
}

impl From<&AccountRecord> for ProvisioningReceipt {
    fn from(record: &AccountRecord) -> Self {
        Self {
            id: record.id.clone(),
            account_number: record.account_number.clone(),
            status: record.status.clone(),
            deadline: record.deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::AccountNumberFactory;

    #[test]
    fn request_accepts_both_spellings() {
        let snake: ProvisioningRequest = serde_json::from_value(serde_json::json!({
            "account_id": 7,
            "application_id": 9,
            "currency": "810"
        }))
        .unwrap();
        assert_eq!(snake.composite_id().as_deref(), Some("7-9"));

        let camel: ProvisioningRequest = serde_json::from_value(serde_json::json!({
            "accountId": 7,
            "applicationId": 9,
            "currencyCode": 810
        }))
        .unwrap();
        assert_eq!(camel.composite_id().as_deref(), Some("7-9"));
        assert_eq!(camel.currency, Some(CurrencyInput::Numeric(810)));
    }

    #[test]
    fn downstream_payload_requires_identifiers() {
        let currency = CurrencyCode::parse("810").unwrap();
        let number = AccountNumberFactory::new().assemble(&currency, 1);

        let anonymous = AccountRecord::processing(
            "x",
            &ProvisioningRequest::new("810"),
            currency.clone(),
            number.clone(),
            Utc::now(),
        );
        assert!(anonymous.downstream_payload().is_none());

        let linked = AccountRecord::processing(
            "3-4",
            &ProvisioningRequest::new("810").with_application(3, 4),
            currency,
            number.clone(),
            Utc::now(),
        );
        let payload = linked.downstream_payload().unwrap();
        assert_eq!(payload.account_id, 3);
        assert_eq!(payload.application_id, 4);
        assert_eq!(payload.number, number.as_u64());
        assert_eq!(payload.status, "processing");
    }
}
