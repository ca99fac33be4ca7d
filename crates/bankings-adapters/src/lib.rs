//! Downstream notifier adapters for the bankings workflow.

#![deny(unsafe_code)]

use async_trait::async_trait;
use bankings_core::error::ProvisioningError;
use bankings_core::notify::DownstreamNotifier;
use bankings_core::types::ProvisionedAccount;
use reqwest::Client;

/// PUTs finalized accounts to the apps_accs service at
/// `{base_url}/api/apps_accs/{account_id}/{application_id}/put/`.
///
/// Any 2xx is success. No retries; the client keeps its default timeouts.
#[derive(Debug, Clone)]
pub struct HttpAppsAccsNotifier {
    client: Client,
    base_url: String,
}

impl HttpAppsAccsNotifier {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, account: &ProvisionedAccount) -> String {
        format!(
            "{}/api/apps_accs/{}/{}/put/",
            self.base_url, account.account_id, account.application_id
        )
    }
}

#[async_trait]
impl DownstreamNotifier for HttpAppsAccsNotifier {
    fn name(&self) -> &'static str {
        "apps_accs_http"
    }

    async fn notify(&self, account: &ProvisionedAccount) -> Result<(), ProvisioningError> {
        let url = self.endpoint(account);
        let response = self
            .client
            .put(&url)
            .json(account)
            .send()
            .await
            .map_err(|err| ProvisioningError::downstream(self.name(), err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisioningError::downstream(
                self.name(),
                format!("PUT {} returned {}", url, status),
            ));
        }

        tracing::debug!(url = %url, status = %status, "apps_accs accepted account");
        Ok(())
    }
}

/// Notifier used when no downstream is configured: logs the account and succeeds.
#[derive(Debug, Clone, Default)]
pub struct LogOnlyNotifier;

#[async_trait]
impl DownstreamNotifier for LogOnlyNotifier {
    fn name(&self) -> &'static str {
        "log_only"
    }

    async fn notify(&self, account: &ProvisionedAccount) -> Result<(), ProvisioningError> {
        tracing::info!(
            account_id = account.account_id,
            application_id = account.application_id,
            number = account.number,
            "no downstream configured; account not delivered"
        );
        Ok(())
    }
}

/// Deterministic failing notifier useful for chaos testing.
#[derive(Debug, Clone)]
pub struct AlwaysFailNotifier {
    reason: String,
}

impl AlwaysFailNotifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl DownstreamNotifier for AlwaysFailNotifier {
    fn name(&self) -> &'static str {
        "always_fail"
    }

    async fn notify(&self, _account: &ProvisionedAccount) -> Result<(), ProvisioningError> {
        Err(ProvisioningError::downstream(self.name(), self.reason.clone()))
    }
}
