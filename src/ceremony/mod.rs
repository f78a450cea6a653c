//! Passkey registration ceremony handling
//!
//! Turns the loosely-typed attestation JSON a browser posts back into a
//! validated [`ParsedRegistration`], and checks it against the relying party
//! before anything is provisioned for it.

mod cbor;
mod errors;
mod parse;
mod types;
mod verifier;

pub(crate) use cbor::parse_attestation_object;
pub use errors::CeremonyError;
pub use parse::parse_registration;
pub use types::{Attestation, AuthenticatorData, CollectedClientData, ParsedRegistration};
pub use verifier::{AttestationVerifier, ClientDataVerifier};
