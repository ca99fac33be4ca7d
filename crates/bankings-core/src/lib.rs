//! Bankings core: synthetic account number issuing with asynchronous finalization.
//!
//! A create request gets a provisional, checksummed account number right away.
//! A bounded scheduler later completes the record with a regenerated number and
//! notifies a downstream service; an inbound result may then finalize it.

#![deny(unsafe_code)]

pub mod auth;
pub mod checksum;
pub mod error;
pub mod flow;
pub mod notify;
pub mod number;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod workflow;

pub use auth::AuthorizationGate;
pub use checksum::{control_char, control_digit};
pub use error::ProvisioningError;
pub use flow::{AccountStage, AccountStatus, TransitionOutcome};
pub use notify::DownstreamNotifier;
pub use number::{AccountNumber, AccountNumberFactory, CurrencyCode, CurrencyInput};
pub use registry::{AccountRegistry, Retain};
pub use scheduler::{FinalizationScheduler, Reservation};
pub use types::{
    AccountRecord, ProvisionedAccount, ProvisioningReceipt, ProvisioningRequest, ResultUpdate,
};
pub use workflow::{ProvisioningWorkflow, RetentionPolicy, WorkflowConfig};
