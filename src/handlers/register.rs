//! Passkey registration endpoints

use actix_web::{web, HttpResponse};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::challenge::ChallengeError;
use crate::registration::{RegistrationError, RegistrationOrchestrator, RejectionReason};
use crate::utils::responses::ResponseBuilder;

#[derive(Serialize, Deserialize, Debug)]
pub struct ChallengeResponse {
    pub challenge: String,
}

/// Body of `POST /api/register`
#[derive(Deserialize, Debug)]
pub struct RegistrationRequest {
    /// Browser `PublicKeyCredential` JSON or a flat attestation
    pub registration: Value,
}

/// Issue a fresh registration challenge
pub async fn registration_challenge(orchestrator: web::Data<RegistrationOrchestrator>) -> HttpResponse {
    match orchestrator.begin() {
        Ok(challenge) => ResponseBuilder::ok()
            .with_header("Cache-Control", "no-store")
            .json(&ChallengeResponse { challenge }),
        Err(e) => {
            error!("Failed to issue registration challenge: {e}");
            ResponseBuilder::internal_server_error().build()
        }
    }
}

/// Verify the ceremony response and provision the user's custody identity
pub async fn complete_registration(
    orchestrator: web::Data<RegistrationOrchestrator>,
    request: web::Json<RegistrationRequest>,
) -> HttpResponse {
    // Dropping this request's future abandons any poll in flight
    let cancel = CancellationToken::new();
    match orchestrator.complete(&request.registration, &cancel).await {
        Ok(registration) => ResponseBuilder::ok().json(&registration),
        Err(err) => registration_error_response(&err),
    }
}

/// Map a registration failure to its HTTP response
#[must_use]
pub fn registration_error_response(err: &RegistrationError) -> HttpResponse {
    match err {
        RegistrationError::RegistrationRejected(RejectionReason::Challenge(ChallengeError::Expired { .. })) => {
            ResponseBuilder::bad_request()
                .with_error_code("challenge_expired")
                .with_message("The registration challenge has expired, request a new one")
                .build()
        }
        RegistrationError::RegistrationRejected(RejectionReason::Challenge(_)) => {
            ResponseBuilder::registration_rejected("The registration challenge is not valid")
        }
        RegistrationError::RegistrationRejected(RejectionReason::Ceremony(_)) => {
            ResponseBuilder::registration_rejected("The passkey attestation could not be verified")
        }
        _ if err.is_timeout() => ResponseBuilder::custody_timeout(),
        RegistrationError::Provisioning { .. } => ResponseBuilder::custody_unavailable(),
        RegistrationError::QuorumHandoffFailed { .. } => ResponseBuilder::bad_gateway()
            .with_error_code("quorum_handoff_failed")
            .with_message("The passkey could not be made the sole owner of the new wallet")
            .build(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::CeremonyError;
    use crate::custody::{CustodyError, PollError};
    use crate::registration::{ProvisioningFailure, ProvisioningStep};
    use actix_web::http::StatusCode;
    use std::time::Duration;

    #[test]
    fn test_error_statuses() {
        let cases = [
            (
                RegistrationError::RegistrationRejected(ChallengeError::ForgedOrCorrupt.into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                RegistrationError::RegistrationRejected(
                    CeremonyError::VerificationFailed("user not verified".into()).into(),
                ),
                StatusCode::BAD_REQUEST,
            ),
            (
                RegistrationError::Provisioning {
                    stage: ProvisioningStep::CreatePrivateKey,
                    reason: ProvisioningFailure::Custody(CustodyError::Transport("reset".into())),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                RegistrationError::Provisioning {
                    stage: ProvisioningStep::CreateSubOrganization,
                    reason: ProvisioningFailure::Poll(PollError::Timeout {
                        elapsed: Duration::from_secs(30),
                    }),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                RegistrationError::QuorumHandoffFailed {
                    sub_organization_id: "sub".into(),
                    reason: "owner missing".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(registration_error_response(&err).status(), status, "{err}");
        }
    }
}
