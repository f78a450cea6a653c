use std::fmt;

use thiserror::Error;

use crate::ceremony::CeremonyError;
use crate::challenge::ChallengeError;
use crate::custody::{ActivityStatus, CustodyError, PollError};

/// Why a registration response was turned away before provisioning
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    Ceremony(#[from] CeremonyError),
}

/// Provisioning steps that talk to the custody service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStep {
    CreateSubOrganization,
    CreatePrivateKey,
    FetchPublicKey,
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateSubOrganization => "create sub-organization",
            Self::CreatePrivateKey => "create private key",
            Self::FetchPublicKey => "fetch public key",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningFailure {
    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("activity {activity_id} ended with {status}")]
    ActivityFailed {
        activity_id: String,
        status: ActivityStatus,
    },

    #[error("activity {activity_id} completed without a {result} result")]
    MissingResult {
        activity_id: String,
        result: &'static str,
    },

    #[error("custody returned an unusable public key: {0}")]
    InvalidPublicKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("registration rejected: {0}")]
    RegistrationRejected(#[from] RejectionReason),

    #[error("provisioning failed during {stage}: {reason}")]
    Provisioning {
        stage: ProvisioningStep,
        reason: ProvisioningFailure,
    },

    #[error("quorum handoff failed for sub-organization {sub_organization_id}: {reason}")]
    QuorumHandoffFailed {
        sub_organization_id: String,
        reason: String,
    },
}

impl RegistrationError {
    pub(crate) fn rejected(reason: impl Into<RejectionReason>) -> Self {
        Self::RegistrationRejected(reason.into())
    }

    pub(crate) fn provisioning(stage: ProvisioningStep, reason: impl Into<ProvisioningFailure>) -> Self {
        Self::Provisioning {
            stage,
            reason: reason.into(),
        }
    }

    /// Whether a custody activity outlived the polling deadline
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Provisioning {
                reason: ProvisioningFailure::Poll(PollError::Timeout { .. }),
                ..
            }
        )
    }
}
