//! CBOR processing for `WebAuthn` attestation objects
//!
//! Only the pieces the server needs are decoded: the authenticator data and
//! the attested credential inside it.

use ciborium::de::from_reader;
use ciborium::value::Value;

use super::errors::CeremonyError;
use super::types::AuthenticatorData;
use crate::utils::encoding::from_base64url;

// rpIdHash (32) + flags (1) + signCount (4)
const FIXED_HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

fn shape(reason: &str) -> CeremonyError {
    CeremonyError::ShapeInvalid(reason.to_string())
}

/// Decode a base64url attestation object and parse its `authData`
pub(crate) fn parse_attestation_object(
    attestation_object_b64: &str,
) -> Result<AuthenticatorData, CeremonyError> {
    let attestation_bytes =
        from_base64url(attestation_object_b64).map_err(|_| shape("attestation encoding"))?;

    let attestation: Value =
        from_reader(attestation_bytes.as_slice()).map_err(|_| shape("attestation CBOR"))?;

    let Some(Some(auth_data)) = attestation.as_map().and_then(|map| {
        map.iter()
            .find(|(k, _)| k.as_text() == Some("authData"))
            .map(|(_, v)| v.as_bytes())
    }) else {
        return Err(shape("missing authData in attestation"));
    };

    parse_authenticator_data(auth_data)
}

/// Parse raw authenticator data with attested credential data
///
/// Layout:
/// - 32 bytes: RP ID hash
/// - 1 byte: flags
/// - 4 bytes: signature counter (big endian)
/// - 16 bytes: AAGUID
/// - 2 bytes: credential ID length (L)
/// - L bytes: credential ID
/// - variable: COSE public key
pub(crate) fn parse_authenticator_data(auth_data: &[u8]) -> Result<AuthenticatorData, CeremonyError> {
    if auth_data.len() < FIXED_HEADER_LEN {
        return Err(shape("auth data too short"));
    }

    let mut rp_id_hash = [0u8; 32];
    rp_id_hash.copy_from_slice(&auth_data[..32]);
    let flags = auth_data[32];
    let sign_count = u32::from_be_bytes([auth_data[33], auth_data[34], auth_data[35], auth_data[36]]);

    if flags & AuthenticatorData::FLAG_ATTESTED_CREDENTIAL_DATA == 0 {
        return Err(shape("no attested credential data"));
    }

    let mut pos = FIXED_HEADER_LEN;
    if auth_data.len() < pos + AAGUID_LEN + 2 {
        return Err(shape("auth data too short for credential ID length"));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&auth_data[pos..pos + AAGUID_LEN]);
    pos += AAGUID_LEN;

    let id_len = usize::from(u16::from_be_bytes([auth_data[pos], auth_data[pos + 1]]));
    pos += 2;

    if auth_data.len() < pos + id_len {
        return Err(shape("auth data too short for credential ID"));
    }
    let credential_id = auth_data[pos..pos + id_len].to_vec();
    pos += id_len;

    if auth_data.len() <= pos {
        return Err(shape("auth data too short for public key"));
    }

    Ok(AuthenticatorData {
        rp_id_hash,
        flags,
        sign_count,
        aaguid,
        credential_id,
        credential_public_key: auth_data[pos..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::AttestationFixture;
    use crate::utils::encoding::to_base64url;

    #[test]
    fn test_parse_fixture_attestation() {
        let fixture = AttestationFixture::new("localhost", "http://localhost:8080");
        let attestation = fixture.attestation_for("challenge-token");

        let auth_data = parse_attestation_object(&attestation.attestation_object).unwrap();
        assert_eq!(auth_data.credential_id, fixture.credential_id);
        assert!(auth_data.user_present());
        assert!(auth_data.user_verified());
        assert!(!auth_data.credential_public_key.is_empty());
    }

    #[test]
    fn test_rejects_non_cbor() {
        let result = parse_attestation_object(&to_base64url(b"not cbor at all"));
        assert!(matches!(result, Err(CeremonyError::ShapeInvalid(_))));
    }

    #[test]
    fn test_rejects_short_auth_data() {
        assert_eq!(
            parse_authenticator_data(&[0u8; 10]),
            Err(shape("auth data too short"))
        );
    }

    #[test]
    fn test_rejects_missing_attested_credential() {
        let mut auth_data = vec![0u8; 37];
        auth_data[32] = AuthenticatorData::FLAG_USER_PRESENT;
        assert_eq!(
            parse_authenticator_data(&auth_data),
            Err(shape("no attested credential data"))
        );
    }

    #[test]
    fn test_rejects_truncated_credential_id() {
        let mut auth_data = vec![0u8; 37 + 16];
        auth_data[32] = AuthenticatorData::FLAG_ATTESTED_CREDENTIAL_DATA;
        auth_data.extend_from_slice(&[0x00, 0x40]); // claims 64 bytes
        auth_data.extend_from_slice(&[1u8; 8]);
        assert_eq!(
            parse_authenticator_data(&auth_data),
            Err(shape("auth data too short for credential ID"))
        );
    }
}
