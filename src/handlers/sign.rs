//! Signing endpoints
//!
//! The browser asks for an unsigned request, stamps its body with the
//! passkey, and posts the stamped request back to be forwarded.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::custody::{CustodyError, PollError, SignedRequest};
use crate::signing::{SignedPayload, SigningError, SigningProxy};
use crate::utils::encoding::from_hex;
use crate::utils::responses::ResponseBuilder;

/// Body of `POST /api/sign/prepare`
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PrepareSigningRequest {
    /// Message bytes, hex encoded
    pub payload: String,
    pub sub_organization_id: String,
    pub private_key_id: String,
}

/// Body of `POST /api/sign`
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub signed_request: SignedRequest,
    /// Base58 public key the signature must verify under before it is returned
    pub public_key: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    pub activity_id: String,
    pub signature: String,
    pub signature_base58: String,
}

/// Build the request body the passkey has to stamp
pub async fn prepare_signing(
    proxy: web::Data<SigningProxy>,
    request: web::Json<PrepareSigningRequest>,
) -> HttpResponse {
    let Ok(payload) = from_hex(&request.payload) else {
        return ResponseBuilder::invalid_field("payload", "expected hex");
    };
    if request.sub_organization_id.is_empty() {
        return ResponseBuilder::invalid_field("subOrganizationId", "must not be empty");
    }
    if request.private_key_id.is_empty() {
        return ResponseBuilder::invalid_field("privateKeyId", "must not be empty");
    }

    match proxy.prepare(&payload, &request.sub_organization_id, &request.private_key_id) {
        Ok(unsigned) => ResponseBuilder::ok()
            .with_header("Cache-Control", "no-store")
            .json(&unsigned),
        Err(err) => signing_error_response(&err),
    }
}

/// Forward a passkey-stamped signing request and return the verified signature
pub async fn sign(proxy: web::Data<SigningProxy>, request: web::Json<SignRequest>) -> HttpResponse {
    if request.public_key.is_empty() {
        return ResponseBuilder::invalid_field("publicKey", "must not be empty");
    }

    let cancel = CancellationToken::new();
    match proxy
        .forward_and_verify(&request.signed_request, &request.public_key, &cancel)
        .await
    {
        Ok(signed) => ResponseBuilder::ok().json(&signed_response(signed)),
        Err(err) => signing_error_response(&err),
    }
}

fn signed_response(signed: SignedPayload) -> SignResponse {
    SignResponse {
        activity_id: signed.activity_id,
        signature: signed.signature.to_hex(),
        signature_base58: signed.signature.to_base58(),
    }
}

/// Map a signing failure to its HTTP response
#[must_use]
pub fn signing_error_response(err: &SigningError) -> HttpResponse {
    match err {
        SigningError::MalformedRequest(reason) => ResponseBuilder::bad_request()
            .with_error_code("malformed_request")
            .with_message(reason)
            .build(),
        SigningError::OperationRejected { .. }
        | SigningError::Custody(CustodyError::Status {
            status: 401 | 403, ..
        }) => ResponseBuilder::forbidden()
            .with_error_code("signing_rejected")
            .with_message("The custody service refused to sign")
            .build(),
        SigningError::VerificationFailed { .. } => ResponseBuilder::unprocessable_entity()
            .with_error_code("signature_invalid")
            .with_message("The returned signature does not verify under the given public key")
            .build(),
        SigningError::Poll(PollError::Timeout { .. }) => ResponseBuilder::custody_timeout(),
        SigningError::MissingResult { .. } | SigningError::Custody(_) | SigningError::Poll(_) => {
            ResponseBuilder::custody_unavailable()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::ActivityStatus;
    use actix_web::http::StatusCode;
    use std::time::Duration;

    #[test]
    fn test_error_statuses() {
        let cases = [
            (SigningError::MalformedRequest("nope".into()), StatusCode::BAD_REQUEST),
            (
                SigningError::OperationRejected {
                    activity_id: "a".into(),
                    status: ActivityStatus::Rejected,
                },
                StatusCode::FORBIDDEN,
            ),
            (
                SigningError::Custody(CustodyError::Status {
                    status: 401,
                    message: "bad stamp".into(),
                }),
                StatusCode::FORBIDDEN,
            ),
            (
                SigningError::VerificationFailed { activity_id: "a".into() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SigningError::Poll(PollError::Timeout {
                    elapsed: Duration::from_secs(30),
                }),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (SigningError::Poll(PollError::Cancelled), StatusCode::BAD_GATEWAY),
            (SigningError::MissingResult { activity_id: "a".into() }, StatusCode::BAD_GATEWAY),
            (
                SigningError::Custody(CustodyError::Transport("reset".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(signing_error_response(&err).status(), status, "{err}");
        }
    }
}
