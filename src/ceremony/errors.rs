use thiserror::Error;

/// `WebAuthn` ceremony failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CeremonyError {
    /// The attestation response is missing fields or cannot be decoded
    #[error("attestation shape invalid: {0}")]
    ShapeInvalid(String),

    /// The attestation decoded but does not match this relying party
    #[error("attestation verification failed: {0}")]
    VerificationFailed(String),
}
