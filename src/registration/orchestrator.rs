//! Passkey registration
//!
//! A registration runs through these stages, stopping at the first failure:
//!
//! ```text
//! ChallengeRequested -> CeremonyPending -> CeremonyReceived
//!     -> IdentityProvisioning -> QuorumHandoff -> Registered
//! ```
//!
//! The sub-organization is created with two root users: the passkey owner and
//! a helper holding the server's API key, which is what lets the server
//! create the signing key without a second passkey prompt. The helper is
//! then dropped from the root quorum, leaving the passkey as the only
//! credential that can authorize anything in the sub-organization.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::errors::{ProvisioningFailure, ProvisioningStep, RegistrationError};
use crate::ceremony::{parse_registration, AttestationVerifier, ParsedRegistration};
use crate::challenge::{ChallengeToken, REGISTER_STAGE};
use crate::custody::types::{
    ApiKeyParams, AuthenticatorParams, CreatePrivateKeysParams, CreateSubOrganizationParams,
    PrivateKeyParams, RootUserParams, UpdateRootQuorumParams, CURVE_ED25519,
};
use crate::custody::{
    bounded, poll_activity, Activity, ActivityStatus, CustodyClient, CustodyError, PollError, PollPolicy,
};
use crate::settings::AppSettings;
use crate::utils::encoding::{fixed_from_hex, to_base58};
use crate::utils::logging::LoggingHelper;

/// Root user name of the passkey owner
pub const OWNER_USER_NAME: &str = "Passkey";
/// Root user name of the bootstrap helper
pub const HELPER_USER_NAME: &str = "Helper";

const AUTHENTICATOR_NAME: &str = "Passkey";
const HELPER_API_KEY_NAME: &str = "Helper";
const PRIVATE_KEY_NAME: &str = "Solana Signing Key";

/// Durable result of a registration, held by the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub sub_organization_id: String,
    pub private_key_id: String,
    /// Base58 Ed25519 public key (Solana address form)
    pub public_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStage {
    ChallengeRequested,
    CeremonyPending,
    CeremonyReceived,
    IdentityProvisioning,
    QuorumHandoff,
    Registered,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ChallengeRequested => "ChallengeRequested",
            Self::CeremonyPending => "CeremonyPending",
            Self::CeremonyReceived => "CeremonyReceived",
            Self::IdentityProvisioning => "IdentityProvisioning",
            Self::QuorumHandoff => "QuorumHandoff",
            Self::Registered => "Registered",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Parent organization the sub-organizations are created under
    pub organization_id: String,
    pub sub_organization_prefix: String,
    /// Compressed P-256 public key of the server's API key
    pub bootstrap_public_key: String,
    pub poll_policy: PollPolicy,
}

impl RegistrationConfig {
    #[must_use]
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            organization_id: settings.custody.organization_id.clone(),
            sub_organization_prefix: settings.custody.sub_organization_prefix.clone(),
            bootstrap_public_key: settings.custody.api_public_key.clone(),
            poll_policy: settings.custody.poll_policy(),
        }
    }
}

pub struct RegistrationOrchestrator {
    config: RegistrationConfig,
    challenges: ChallengeToken,
    custody: Arc<dyn CustodyClient>,
    verifier: Arc<dyn AttestationVerifier>,
}

impl RegistrationOrchestrator {
    #[must_use]
    pub fn new(
        config: RegistrationConfig,
        challenges: ChallengeToken,
        custody: Arc<dyn CustodyClient>,
        verifier: Arc<dyn AttestationVerifier>,
    ) -> Self {
        Self {
            config,
            challenges,
            custody,
            verifier,
        }
    }

    /// Issue a registration challenge for the browser ceremony
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge cannot be sealed
    pub fn begin(&self) -> anyhow::Result<String> {
        LoggingHelper::log_registration_stage(&RegistrationStage::ChallengeRequested.to_string(), None);
        let token = self.challenges.issue(REGISTER_STAGE)?;
        LoggingHelper::log_challenge_issued(REGISTER_STAGE);
        LoggingHelper::log_registration_stage(&RegistrationStage::CeremonyPending.to_string(), None);
        Ok(token)
    }

    /// Verify a ceremony response and provision a custody identity for it
    ///
    /// # Errors
    ///
    /// - `RegistrationRejected` if the response, its challenge or its
    ///   attestation do not check out; nothing has been provisioned
    /// - `Provisioning` if the custody service fails to create the
    ///   sub-organization or key
    /// - `QuorumHandoffFailed` if the helper cannot be verifiably removed from
    ///   the root quorum; the registration must not be used
    pub async fn complete(
        &self,
        response: &Value,
        cancel: &CancellationToken,
    ) -> Result<Registration, RegistrationError> {
        let ceremony = self.accept_ceremony(response)?;
        LoggingHelper::log_registration_stage(&RegistrationStage::CeremonyReceived.to_string(), None);

        LoggingHelper::log_registration_stage(&RegistrationStage::IdentityProvisioning.to_string(), None);
        let sub_organization_id = self.create_sub_organization(&ceremony, cancel).await?;

        let outcome = self.provision_and_hand_off(&sub_organization_id, cancel).await;
        match outcome {
            Ok(registration) => {
                LoggingHelper::log_registration_stage(
                    &RegistrationStage::Registered.to_string(),
                    Some(&sub_organization_id),
                );
                LoggingHelper::log_registration_complete(
                    &registration.sub_organization_id,
                    &registration.private_key_id,
                    &registration.public_key,
                );
                Ok(registration)
            }
            Err(err) => {
                LoggingHelper::log_orphaned_sub_organization(
                    &sub_organization_id,
                    &stage_of(&err).to_string(),
                    &err.to_string(),
                );
                Err(err)
            }
        }
    }

    fn accept_ceremony(&self, response: &Value) -> Result<ParsedRegistration, RegistrationError> {
        let outcome = parse_registration(response)
            .map_err(RegistrationError::rejected)
            .and_then(|parsed| {
                self.challenges
                    .verify(REGISTER_STAGE, &parsed.challenge)
                    .map_err(RegistrationError::rejected)?;
                self.verifier
                    .verify(&parsed)
                    .map_err(RegistrationError::rejected)?;
                Ok(parsed)
            });

        if let Err(err) = &outcome {
            LoggingHelper::log_registration_rejected(&err.to_string());
        }
        outcome
    }

    async fn create_sub_organization(
        &self,
        ceremony: &ParsedRegistration,
        cancel: &CancellationToken,
    ) -> Result<String, RegistrationError> {
        let step = ProvisioningStep::CreateSubOrganization;
        let params = CreateSubOrganizationParams {
            sub_organization_name: format!("{} {}", self.config.sub_organization_prefix, Uuid::new_v4()),
            root_quorum_threshold: 1,
            root_users: vec![
                RootUserParams {
                    user_name: OWNER_USER_NAME.to_string(),
                    api_keys: vec![],
                    authenticators: vec![AuthenticatorParams {
                        authenticator_name: AUTHENTICATOR_NAME.to_string(),
                        challenge: ceremony.challenge.clone(),
                        attestation: ceremony.attestation.clone(),
                    }],
                },
                RootUserParams {
                    user_name: HELPER_USER_NAME.to_string(),
                    api_keys: vec![ApiKeyParams {
                        api_key_name: HELPER_API_KEY_NAME.to_string(),
                        public_key: self.config.bootstrap_public_key.clone(),
                    }],
                    authenticators: vec![],
                },
            ],
        };

        let submitted = self
            .within_deadline(
                cancel,
                self.custody.create_sub_organization(&self.config.organization_id, params),
            )
            .await
            .map_err(|e| RegistrationError::provisioning(step, e))?;
        let activity = self.settle(step, submitted, cancel).await?;

        activity
            .result
            .create_sub_organization_result
            .map(|r| r.sub_organization_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                RegistrationError::provisioning(
                    step,
                    ProvisioningFailure::MissingResult {
                        activity_id: activity.id.clone(),
                        result: "createSubOrganizationResult",
                    },
                )
            })
    }

    async fn provision_and_hand_off(
        &self,
        sub_organization_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Registration, RegistrationError> {
        let private_key_id = self.create_private_key(sub_organization_id, cancel).await?;
        let public_key = self
            .fetch_public_key(sub_organization_id, &private_key_id, cancel)
            .await?;

        LoggingHelper::log_registration_stage(
            &RegistrationStage::QuorumHandoff.to_string(),
            Some(sub_organization_id),
        );
        self.hand_off_quorum(sub_organization_id, cancel)
            .await
            .map_err(|reason| RegistrationError::QuorumHandoffFailed {
                sub_organization_id: sub_organization_id.to_string(),
                reason,
            })?;

        Ok(Registration {
            sub_organization_id: sub_organization_id.to_string(),
            private_key_id,
            public_key: to_base58(public_key.as_bytes()),
        })
    }

    async fn create_private_key(
        &self,
        sub_organization_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, RegistrationError> {
        let step = ProvisioningStep::CreatePrivateKey;
        let params = CreatePrivateKeysParams {
            private_keys: vec![PrivateKeyParams {
                private_key_name: PRIVATE_KEY_NAME.to_string(),
                curve: CURVE_ED25519.to_string(),
                address_formats: vec![],
                private_key_tags: vec![],
            }],
        };

        let submitted = self
            .within_deadline(cancel, self.custody.create_private_keys(sub_organization_id, params))
            .await
            .map_err(|e| RegistrationError::provisioning(step, e))?;
        let activity = self.settle(step, submitted, cancel).await?;

        activity
            .result
            .create_private_keys_result_v2
            .and_then(|r| r.private_keys.into_iter().next())
            .map(|k| k.private_key_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                RegistrationError::provisioning(
                    step,
                    ProvisioningFailure::MissingResult {
                        activity_id: activity.id.clone(),
                        result: "createPrivateKeysResultV2",
                    },
                )
            })
    }

    async fn fetch_public_key(
        &self,
        sub_organization_id: &str,
        private_key_id: &str,
        cancel: &CancellationToken,
    ) -> Result<VerifyingKey, RegistrationError> {
        let step = ProvisioningStep::FetchPublicKey;
        let private_key = self
            .within_deadline(cancel, self.custody.get_private_key(sub_organization_id, private_key_id))
            .await
            .map_err(|e| RegistrationError::provisioning(step, e))?;

        let invalid = |detail: &str| {
            RegistrationError::provisioning(
                step,
                ProvisioningFailure::InvalidPublicKey(format!("{detail}: {}", private_key.public_key)),
            )
        };
        let bytes = fixed_from_hex::<32>(&private_key.public_key)
            .ok_or_else(|| invalid("expected 32 hex-encoded bytes"))?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| invalid("not an Ed25519 point"))
    }

    /// Make the passkey owner the sole root user, then confirm it took
    async fn hand_off_quorum(
        &self,
        sub_organization_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let users = self
            .within_deadline(cancel, self.custody.list_users(sub_organization_id))
            .await
            .map_err(|e| e.to_string())?;

        let mut owners = users.iter().filter(|u| u.user_name == OWNER_USER_NAME);
        let owner = match (owners.next(), owners.next()) {
            (Some(owner), None) => owner,
            (None, _) => return Err("passkey owner not found among users".into()),
            (Some(_), Some(_)) => return Err("more than one passkey owner user".into()),
        };

        let params = UpdateRootQuorumParams {
            threshold: 1,
            user_ids: vec![owner.user_id.clone()],
        };
        let submitted = self
            .within_deadline(cancel, self.custody.update_root_quorum(sub_organization_id, params))
            .await
            .map_err(|e| e.to_string())?;
        let activity = poll_activity(self.custody.as_ref(), submitted, &self.config.poll_policy, cancel)
            .await
            .map_err(|e| e.to_string())?;
        if activity.status != ActivityStatus::Completed {
            return Err(format!("quorum update {} ended with {}", activity.id, activity.status));
        }

        // Trust the service's view, not the update's acknowledgement
        let quorum = self
            .within_deadline(cancel, self.custody.get_root_quorum(sub_organization_id))
            .await
            .map_err(|e| e.to_string())?;
        if quorum.threshold != 1 || quorum.user_ids != [owner.user_id.clone()] {
            return Err(format!(
                "root quorum is {:?} with threshold {}, expected only the owner",
                quorum.user_ids, quorum.threshold
            ));
        }
        Ok(())
    }

    async fn within_deadline<T>(
        &self,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<T, CustodyError>>,
    ) -> Result<T, PollError> {
        bounded(&self.config.poll_policy, cancel, call).await
    }

    /// Poll a submitted activity and insist that it completed
    async fn settle(
        &self,
        step: ProvisioningStep,
        submitted: Activity,
        cancel: &CancellationToken,
    ) -> Result<Activity, RegistrationError> {
        let activity = poll_activity(self.custody.as_ref(), submitted, &self.config.poll_policy, cancel)
            .await
            .map_err(|e| RegistrationError::provisioning(step, e))?;

        if activity.status == ActivityStatus::Completed {
            Ok(activity)
        } else {
            Err(RegistrationError::provisioning(
                step,
                ProvisioningFailure::ActivityFailed {
                    activity_id: activity.id,
                    status: activity.status,
                },
            ))
        }
    }
}

fn stage_of(err: &RegistrationError) -> RegistrationStage {
    match err {
        RegistrationError::RegistrationRejected(_) => RegistrationStage::CeremonyReceived,
        RegistrationError::Provisioning { .. } => RegistrationStage::IdentityProvisioning,
        RegistrationError::QuorumHandoffFailed { .. } => RegistrationStage::QuorumHandoff,
    }
}
