//! Passkey registration: challenge, ceremony verification, custody
//! provisioning and root quorum handoff

mod errors;
mod orchestrator;

pub use errors::{ProvisioningFailure, ProvisioningStep, RegistrationError, RejectionReason};
pub use orchestrator::{
    Registration, RegistrationConfig, RegistrationOrchestrator, RegistrationStage,
    HELPER_USER_NAME, OWNER_USER_NAME,
};
