//! Data types for the registration ceremony

use serde::{Deserialize, Serialize};

/// Attestation in the form the custody service stores for an authenticator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub credential_id: String,      // Base64URL-encoded credential ID
    pub client_data_json: String,   // Base64URL-encoded client data JSON
    pub attestation_object: String, // Base64URL-encoded CBOR attestation object
    #[serde(default)]
    pub transports: Vec<String>, // AUTHENTICATOR_TRANSPORT_* names
}

/// The subset of `CollectedClientData` the server relies on
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String, // "webauthn.create" for registrations
    pub challenge: String, // Echo of the server challenge, base64url
    pub origin: String,
    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: bool,
}

/// Decoded authenticator data from the attestation object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    pub credential_public_key: Vec<u8>, // COSE-encoded
}

impl AuthenticatorData {
    pub const FLAG_USER_PRESENT: u8 = 0x01;
    pub const FLAG_USER_VERIFIED: u8 = 0x04;
    pub const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;

    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & Self::FLAG_USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & Self::FLAG_USER_VERIFIED != 0
    }
}

/// A registration response that passed shape validation
#[derive(Clone, Debug)]
pub struct ParsedRegistration {
    /// The challenge token echoed back by the authenticator
    pub challenge: String,
    pub client_data: CollectedClientData,
    pub authenticator_data: AuthenticatorData,
    /// Normalized attestation, ready to hand to the custody service
    pub attestation: Attestation,
}

impl ParsedRegistration {
    #[must_use]
    pub fn credential_id(&self) -> &str {
        &self.attestation.credential_id
    }
}
