use crate::error::ProvisioningError;
use crate::types::ProvisionedAccount;
use async_trait::async_trait;

/// Pluggable downstream delivery of finalized accounts.
///
/// Delivery is fire-and-forget: the workflow logs a failure and moves on. The
/// local record has already advanced by the time `notify` runs.
#[async_trait]
pub trait DownstreamNotifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, account: &ProvisionedAccount) -> Result<(), ProvisioningError>;
}
