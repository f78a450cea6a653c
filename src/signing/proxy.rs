//! Signing through the custody service
//!
//! A payload is wrapped in a `SIGN_RAW_PAYLOAD` activity, stamped, submitted
//! and polled until it settles. The resulting `r` and `s` are concatenated
//! into the 64-byte Ed25519 signature. Nothing is retried or cached: a
//! rejected or malformed outcome is handed straight back to the caller.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::errors::SigningError;
use super::verifier::SignatureVerifier;
use crate::custody::types::{
    paths, ActivityRequest, SignRawPayloadParams, SignRawPayloadResult,
    ACTIVITY_TYPE_SIGN_RAW_PAYLOAD, HASH_FUNCTION_NOT_APPLICABLE, PAYLOAD_ENCODING_HEXADECIMAL,
};
use crate::custody::{
    bounded, poll_activity, ActivityStatus, CustodyClient, PollPolicy, SignedRequest, Stamper, UnsignedRequest,
};
use crate::utils::encoding::{fixed_from_hex, from_hex, to_base58, to_hex};
use crate::utils::logging::LoggingHelper;

/// Raw Ed25519 signature, `r ‖ s`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawSignature([u8; 64]);

impl RawSignature {
    /// Join hex-encoded `r` and `s`, each exactly 32 bytes
    #[must_use]
    pub fn from_components(r: &str, s: &str) -> Option<Self> {
        let r = fixed_from_hex::<32>(r)?;
        let s = fixed_from_hex::<32>(s)?;
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&r);
        bytes[32..].copy_from_slice(&s);
        Some(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }

    #[must_use]
    pub fn to_base58(&self) -> String {
        to_base58(&self.0)
    }
}

impl From<[u8; 64]> for RawSignature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for RawSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawSignature({})", self.to_hex())
    }
}

/// A signature together with what it signs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub activity_id: String,
    pub payload: Vec<u8>,
    pub signature: RawSignature,
}

/// Build the activity body asking for a raw Ed25519 signature over `payload`
#[must_use]
pub fn sign_raw_payload_request(
    payload: &[u8],
    sub_organization_id: &str,
    private_key_id: &str,
) -> ActivityRequest<SignRawPayloadParams> {
    ActivityRequest::new(
        ACTIVITY_TYPE_SIGN_RAW_PAYLOAD,
        sub_organization_id,
        SignRawPayloadParams {
            private_key_id: private_key_id.to_string(),
            payload: to_hex(payload),
            encoding: PAYLOAD_ENCODING_HEXADECIMAL.to_string(),
            // Ed25519 signs the message itself
            hash_function: HASH_FUNCTION_NOT_APPLICABLE.to_string(),
        },
    )
}

pub struct SigningProxy {
    custody: Arc<dyn CustodyClient>,
    stamper: Arc<dyn Stamper>,
    policy: PollPolicy,
}

impl SigningProxy {
    #[must_use]
    pub fn new(custody: Arc<dyn CustodyClient>, stamper: Arc<dyn Stamper>, policy: PollPolicy) -> Self {
        Self {
            custody,
            stamper,
            policy,
        }
    }

    /// The unsigned request for `payload`, for a passkey to stamp
    ///
    /// # Errors
    ///
    /// Returns `SigningError::MalformedRequest` if the body cannot be encoded
    pub fn prepare(
        &self,
        payload: &[u8],
        sub_organization_id: &str,
        private_key_id: &str,
    ) -> Result<UnsignedRequest, SigningError> {
        let request = sign_raw_payload_request(payload, sub_organization_id, private_key_id);
        let body = serde_json::to_string(&request).map_err(|e| SigningError::MalformedRequest(e.to_string()))?;
        Ok(UnsignedRequest {
            body,
            url: self.custody.endpoint_url(paths::SIGN_RAW_PAYLOAD),
        })
    }

    /// Sign `payload`, stamping the request with this proxy's stamper
    ///
    /// # Errors
    ///
    /// - `OperationRejected` if the activity ends in a failure status
    /// - `MissingResult` if it completes without a well-formed result
    /// - `Custody` / `Poll` for transport failures, timeout or cancellation
    pub async fn sign(
        &self,
        payload: &[u8],
        sub_organization_id: &str,
        private_key_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RawSignature, SigningError> {
        let unsigned = self.prepare(payload, sub_organization_id, private_key_id)?;
        let stamp = self.stamper.stamp(&unsigned.body)?;
        let request = SignedRequest {
            body: unsigned.body,
            stamp,
            url: unsigned.url,
        };
        Ok(self.forward(&request, cancel).await?.signature)
    }

    /// Submit a request someone else stamped and wait for its signature
    ///
    /// Only `SIGN_RAW_PAYLOAD` activities addressed to the custody service
    /// are forwarded.
    ///
    /// # Errors
    ///
    /// `MalformedRequest` for anything else, otherwise as [`SigningProxy::sign`]
    pub async fn forward(
        &self,
        request: &SignedRequest,
        cancel: &CancellationToken,
    ) -> Result<SignedPayload, SigningError> {
        let payload = self.inspect(request)?;
        LoggingHelper::log_signing_submitted(&payload.organization_id, payload.bytes.len());

        let submitted = bounded(&self.policy, cancel, self.custody.submit_signed(request)).await?;
        let activity = poll_activity(self.custody.as_ref(), submitted, &self.policy, cancel).await?;
        LoggingHelper::log_signing_result(&activity.id, &activity.status);

        if activity.status != ActivityStatus::Completed {
            return Err(SigningError::OperationRejected {
                activity_id: activity.id,
                status: activity.status,
            });
        }

        let signature = activity
            .result
            .sign_raw_payload_result
            .as_ref()
            .and_then(|SignRawPayloadResult { r, s, .. }| RawSignature::from_components(r, s))
            .ok_or_else(|| SigningError::MissingResult {
                activity_id: activity.id.clone(),
            })?;

        Ok(SignedPayload {
            activity_id: activity.id,
            payload: payload.bytes,
            signature,
        })
    }

    /// [`SigningProxy::sign`], then check the signature before returning it
    ///
    /// # Errors
    ///
    /// `VerificationFailed` if the signature does not verify under
    /// `public_key` (base58), otherwise as [`SigningProxy::sign`]
    pub async fn sign_and_verify(
        &self,
        payload: &[u8],
        sub_organization_id: &str,
        private_key_id: &str,
        public_key: &str,
        cancel: &CancellationToken,
    ) -> Result<RawSignature, SigningError> {
        let unsigned = self.prepare(payload, sub_organization_id, private_key_id)?;
        let stamp = self.stamper.stamp(&unsigned.body)?;
        let request = SignedRequest {
            body: unsigned.body,
            stamp,
            url: unsigned.url,
        };
        Ok(self.forward_and_verify(&request, public_key, cancel).await?.signature)
    }

    /// [`SigningProxy::forward`], then check the signature before returning it
    ///
    /// # Errors
    ///
    /// As [`SigningProxy::sign_and_verify`]
    pub async fn forward_and_verify(
        &self,
        request: &SignedRequest,
        public_key: &str,
        cancel: &CancellationToken,
    ) -> Result<SignedPayload, SigningError> {
        let signed = self.forward(request, cancel).await?;
        if !SignatureVerifier::verify_base58(&signed.payload, signed.signature.as_bytes(), public_key) {
            LoggingHelper::log_signature_rejected(&signed.activity_id);
            return Err(SigningError::VerificationFailed {
                activity_id: signed.activity_id,
            });
        }
        Ok(signed)
    }

    /// Check a stamped request is a raw-payload signing request for the
    /// custody service, and pull out what it signs
    fn inspect(&self, request: &SignedRequest) -> Result<InspectedPayload, SigningError> {
        let malformed = |reason: &str| SigningError::MalformedRequest(reason.to_string());

        if request.url != self.custody.endpoint_url(paths::SIGN_RAW_PAYLOAD) {
            return Err(malformed("request is not addressed to the signing endpoint"));
        }
        if request.stamp.stamp_header_name.is_empty() || request.stamp.stamp_header_value.is_empty() {
            return Err(malformed("request is not stamped"));
        }

        let body: ActivityRequest<SignRawPayloadParams> =
            serde_json::from_str(&request.body).map_err(|_| malformed("body is not a signing activity"))?;
        if body.activity_type != ACTIVITY_TYPE_SIGN_RAW_PAYLOAD {
            return Err(malformed("body is not a signing activity"));
        }
        if body.parameters.encoding != PAYLOAD_ENCODING_HEXADECIMAL
            || body.parameters.hash_function != HASH_FUNCTION_NOT_APPLICABLE
        {
            return Err(malformed("unsupported payload encoding or hash function"));
        }
        let bytes = from_hex(&body.parameters.payload).map_err(|_| malformed("payload is not hex"))?;

        Ok(InspectedPayload {
            organization_id: body.organization_id,
            bytes,
        })
    }
}

struct InspectedPayload {
    organization_id: String,
    bytes: Vec<u8>,
}
