//! Test fixtures providing pre-built test objects

use ciborium::value::Value as CborValue;
use serde_json::{json, Value};

use super::constants::{TEST_ORGANIZATION_ID, TEST_RP_ID, TEST_RP_ORIGIN};
use super::passkey::SoftwarePasskey;
use crate::ceremony::Attestation;
use crate::custody::ApiKeyStamper;
use crate::settings::AppSettings;
use crate::utils::encoding::to_base64url;

/// Builds registration ceremony responses from a software passkey
#[derive(Clone)]
pub struct AttestationFixture {
    pub credential_id: Vec<u8>,
    passkey: SoftwarePasskey,
    ceremony_type: String,
    flags: u8,
}

impl AttestationFixture {
    /// UP | UV | AT
    pub const FLAGS_VERIFIED: u8 = 0x45;
    /// UP | AT
    pub const FLAGS_PRESENT_ONLY: u8 = 0x41;

    #[must_use]
    pub fn new(rp_id: &str, origin: &str) -> Self {
        Self::for_passkey(SoftwarePasskey::new(rp_id, origin))
    }

    #[must_use]
    pub fn for_passkey(passkey: SoftwarePasskey) -> Self {
        Self {
            credential_id: passkey.credential_id.clone(),
            passkey,
            ceremony_type: "webauthn.create".to_string(),
            flags: Self::FLAGS_VERIFIED,
        }
    }

    #[must_use]
    pub fn with_ceremony_type(mut self, ceremony_type: &str) -> Self {
        self.ceremony_type = ceremony_type.to_string();
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// The passkey behind this fixture, for stamping later requests
    #[must_use]
    pub fn passkey(&self) -> &SoftwarePasskey {
        &self.passkey
    }

    #[must_use]
    pub fn credential_id_b64(&self) -> String {
        to_base64url(&self.credential_id)
    }

    /// Flat attestation, as the custody service accepts it
    #[must_use]
    pub fn attestation_for(&self, challenge: &str) -> Attestation {
        Attestation {
            credential_id: self.credential_id_b64(),
            client_data_json: to_base64url(self.client_data(challenge).as_bytes()),
            attestation_object: to_base64url(&self.attestation_object()),
            transports: vec!["AUTHENTICATOR_TRANSPORT_INTERNAL".to_string()],
        }
    }

    /// `PublicKeyCredential` JSON, as a browser posts it back
    #[must_use]
    pub fn browser_response(&self, challenge: &str) -> Value {
        json!({
            "id": self.credential_id_b64(),
            "rawId": self.credential_id_b64(),
            "type": "public-key",
            "response": {
                "clientDataJSON": to_base64url(self.client_data(challenge).as_bytes()),
                "attestationObject": to_base64url(&self.attestation_object()),
                "transports": ["internal", "hybrid"],
            },
        })
    }

    fn client_data(&self, challenge: &str) -> String {
        json!({
            "type": self.ceremony_type,
            "challenge": challenge,
            "origin": self.passkey.origin,
            "crossOrigin": false,
        })
        .to_string()
    }

    fn authenticator_data(&self) -> Vec<u8> {
        let mut data = self.passkey.rp_id_hash().to_vec();
        data.push(self.flags);
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        let id_len = u16::try_from(self.credential_id.len()).unwrap_or(u16::MAX);
        data.extend_from_slice(&id_len.to_be_bytes());
        data.extend_from_slice(&self.credential_id);
        data.extend_from_slice(&self.passkey.cose_public_key());
        data
    }

    /// `none` attestation wrapping the authenticator data
    ///
    /// # Panics
    ///
    /// Panics if CBOR encoding into memory fails.
    fn attestation_object(&self) -> Vec<u8> {
        let object = CborValue::Map(vec![
            (CborValue::Text("fmt".into()), CborValue::Text("none".into())),
            (CborValue::Text("attStmt".into()), CborValue::Map(vec![])),
            (CborValue::Text("authData".into()), CborValue::Bytes(self.authenticator_data())),
        ]);
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&object, &mut encoded).expect("attestation object encodes");
        encoded
    }
}

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Settings that pass validation, with a fresh API key pair
    #[must_use]
    pub fn settings() -> AppSettings {
        let stamper = ApiKeyStamper::generate();
        let mut settings = AppSettings::default();
        settings.challenge.encryption_key = "42".repeat(32);
        settings.passkey.rp_id = TEST_RP_ID.to_string();
        settings.passkey.rp_origin = TEST_RP_ORIGIN.to_string();
        settings.custody.organization_id = TEST_ORGANIZATION_ID.to_string();
        settings.custody.api_public_key = stamper.public_key_hex().to_string();
        settings.custody.api_private_key = stamper.private_key_hex();
        settings.custody.poll_interval_ms = 1;
        settings.custody.poll_timeout_seconds = 2;
        settings
    }

    /// Attestation fixture for the default relying party
    #[must_use]
    pub fn attestation() -> AttestationFixture {
        AttestationFixture::new(TEST_RP_ID, TEST_RP_ORIGIN)
    }
}
