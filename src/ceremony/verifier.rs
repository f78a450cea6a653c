use sha2::{Digest, Sha256};

use super::errors::CeremonyError;
use super::types::ParsedRegistration;
use crate::utils::encoding::from_base64url;

const CREATE_CEREMONY: &str = "webauthn.create";

/// Relying-party checks on a shape-valid registration
///
/// Checking the echoed challenge is the caller's job; implementations only
/// vouch for the ceremony data itself.
pub trait AttestationVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns `CeremonyError::VerificationFailed` if the registration does
    /// not belong to this relying party
    fn verify(&self, registration: &ParsedRegistration) -> Result<(), CeremonyError>;
}

/// Verifies client data and authenticator data against the relying party
///
/// The attestation statement itself is left to the custody service, which
/// checks it again when the authenticator is attached.
#[derive(Debug, Clone)]
pub struct ClientDataVerifier {
    rp_id: String,
    rp_origin: String,
    require_user_verification: bool,
}

impl ClientDataVerifier {
    #[must_use]
    pub fn new(rp_id: &str, rp_origin: &str) -> Self {
        Self {
            rp_id: rp_id.to_string(),
            rp_origin: rp_origin.trim_end_matches('/').to_string(),
            require_user_verification: true,
        }
    }

    #[must_use]
    pub fn require_user_verification(mut self, required: bool) -> Self {
        self.require_user_verification = required;
        self
    }
}

fn failed(reason: impl Into<String>) -> CeremonyError {
    CeremonyError::VerificationFailed(reason.into())
}

impl AttestationVerifier for ClientDataVerifier {
    fn verify(&self, registration: &ParsedRegistration) -> Result<(), CeremonyError> {
        let client_data = &registration.client_data;
        let auth_data = &registration.authenticator_data;

        if client_data.ceremony_type != CREATE_CEREMONY {
            return Err(failed(format!(
                "invalid ceremony type: {}",
                client_data.ceremony_type
            )));
        }

        if client_data.origin.trim_end_matches('/') != self.rp_origin {
            return Err(failed(format!("origin mismatch: {}", client_data.origin)));
        }

        if client_data.cross_origin {
            return Err(failed("cross-origin ceremony"));
        }

        let expected_rp_hash = Sha256::digest(self.rp_id.as_bytes());
        if auth_data.rp_id_hash.as_slice() != expected_rp_hash.as_slice() {
            return Err(failed("RP ID hash mismatch"));
        }

        if !auth_data.user_present() {
            return Err(failed("user not present"));
        }

        if self.require_user_verification && !auth_data.user_verified() {
            return Err(failed("user not verified"));
        }

        let claimed_id = from_base64url(registration.credential_id())
            .map_err(|_| failed("credential id is not base64url"))?;
        if claimed_id != auth_data.credential_id {
            return Err(failed("credential id does not match authenticator data"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::parse_registration;
    use crate::testing::fixtures::AttestationFixture;
    use serde_json::json;

    const RP_ID: &str = "localhost";
    const ORIGIN: &str = "http://localhost:8080";

    fn verifier() -> ClientDataVerifier {
        ClientDataVerifier::new(RP_ID, ORIGIN)
    }

    fn parsed(fixture: &AttestationFixture) -> ParsedRegistration {
        parse_registration(&fixture.browser_response("challenge")).unwrap()
    }

    #[test]
    fn test_accepts_matching_registration() {
        let fixture = AttestationFixture::new(RP_ID, ORIGIN);
        assert!(verifier().verify(&parsed(&fixture)).is_ok());
    }

    #[test]
    fn test_trailing_slash_origin_is_equivalent() {
        let fixture = AttestationFixture::new(RP_ID, "http://localhost:8080/");
        assert!(verifier().verify(&parsed(&fixture)).is_ok());
    }

    #[test]
    fn test_rejects_foreign_origin() {
        let fixture = AttestationFixture::new(RP_ID, "https://evil.example");
        assert!(matches!(
            verifier().verify(&parsed(&fixture)),
            Err(CeremonyError::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_rejects_foreign_rp_id() {
        let fixture = AttestationFixture::new("evil.example", ORIGIN);
        assert_eq!(
            verifier().verify(&parsed(&fixture)),
            Err(failed("RP ID hash mismatch"))
        );
    }

    #[test]
    fn test_rejects_assertion_ceremony() {
        let fixture = AttestationFixture::new(RP_ID, ORIGIN).with_ceremony_type("webauthn.get");
        assert!(matches!(
            verifier().verify(&parsed(&fixture)),
            Err(CeremonyError::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_user_verification_requirement() {
        let fixture = AttestationFixture::new(RP_ID, ORIGIN).with_flags(AttestationFixture::FLAGS_PRESENT_ONLY);
        let registration = parsed(&fixture);

        assert_eq!(
            verifier().verify(&registration),
            Err(failed("user not verified"))
        );
        assert!(verifier()
            .require_user_verification(false)
            .verify(&registration)
            .is_ok());
    }

    #[test]
    fn test_rejects_mismatched_credential_id() {
        let fixture = AttestationFixture::new(RP_ID, ORIGIN);
        let mut value = fixture.browser_response("challenge");
        value["id"] = json!("c29tZXRoaW5nLWVsc2U");

        let registration = parse_registration(&value).unwrap();
        assert_eq!(
            verifier().verify(&registration),
            Err(failed("credential id does not match authenticator data"))
        );
    }
}
