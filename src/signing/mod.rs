//! Passkey-authorized signing
//!
//! [`SigningProxy`] submits raw-payload signing activities and hands back
//! the resulting Ed25519 signature; [`SignatureVerifier`] checks it locally.

mod errors;
mod proxy;
mod verifier;

pub use errors::SigningError;
pub use proxy::{sign_raw_payload_request, RawSignature, SignedPayload, SigningProxy};
pub use verifier::SignatureVerifier;
