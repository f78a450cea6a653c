//! A software passkey
//!
//! Produces the same artifacts a browser authenticator would: a `none`
//! attestation for registration, and `X-Stamp-WebAuthn` assertion stamps for
//! signing requests.

use ciborium::value::Value as CborValue;
use p256::ecdsa::{signature::Signer, signature::Verifier, Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::custody::{CustodyError, Stamp, Stamper, WEBAUTHN_STAMP_HEADER};
use crate::utils::crypto::random_bytes;
use crate::utils::encoding::{from_base64url, to_base64url, to_hex};

const COSE_KTY: i64 = 1;
const COSE_ALG: i64 = 3;
const COSE_CRV: i64 = -1;
const COSE_X: i64 = -2;
const COSE_Y: i64 = -3;

/// Decoded contents of an `X-Stamp-WebAuthn` header
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebAuthnStamp {
    pub credential_id: String,      // base64url
    pub authenticator_data: String, // base64url
    pub client_data_json: String,   // base64url
    pub signature: String,          // base64url DER
}

/// ES256 credential held in memory
#[derive(Clone)]
pub struct SoftwarePasskey {
    pub credential_id: Vec<u8>,
    pub rp_id: String,
    pub origin: String,
    signing_key: SigningKey,
}

impl SoftwarePasskey {
    #[must_use]
    pub fn new(rp_id: &str, origin: &str) -> Self {
        let signing_key = loop {
            if let Ok(key) = SigningKey::from_slice(&random_bytes::<32>()) {
                break key;
            }
        };
        Self {
            credential_id: random_bytes::<32>().to_vec(),
            rp_id: rp_id.to_string(),
            origin: origin.to_string(),
            signing_key,
        }
    }

    #[must_use]
    pub fn credential_id_b64(&self) -> String {
        to_base64url(&self.credential_id)
    }

    #[must_use]
    pub fn rp_id_hash(&self) -> [u8; 32] {
        Sha256::digest(self.rp_id.as_bytes()).into()
    }

    /// Public key as a COSE_Key map (EC2, P-256, ES256)
    ///
    /// # Panics
    ///
    /// Panics if CBOR encoding into memory fails.
    #[must_use]
    pub fn cose_public_key(&self) -> Vec<u8> {
        let point = self.signing_key.verifying_key().as_affine().to_encoded_point(false);
        let x = point.x().map(|x| x.to_vec()).unwrap_or_default();
        let y = point.y().map(|y| y.to_vec()).unwrap_or_default();

        let cose = CborValue::Map(vec![
            (CborValue::Integer(COSE_KTY.into()), CborValue::Integer(2_i64.into())),
            (CborValue::Integer(COSE_ALG.into()), CborValue::Integer((-7_i64).into())),
            (CborValue::Integer(COSE_CRV.into()), CborValue::Integer(1_i64.into())),
            (CborValue::Integer(COSE_X.into()), CborValue::Bytes(x)),
            (CborValue::Integer(COSE_Y.into()), CborValue::Bytes(y)),
        ]);
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&cose, &mut encoded).expect("COSE key encodes");
        encoded
    }

    /// Sign an assertion over `challenge` the way an authenticator does
    fn sign_assertion(&self, challenge: &[u8]) -> WebAuthnStamp {
        let mut authenticator_data = self.rp_id_hash().to_vec();
        authenticator_data.push(0x05); // UP | UV
        authenticator_data.extend_from_slice(&1u32.to_be_bytes());

        let client_data = serde_json::json!({
            "type": "webauthn.get",
            "challenge": to_base64url(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        })
        .to_string();

        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&Sha256::digest(client_data.as_bytes()));
        let signature: Signature = self.signing_key.sign(&signed);

        WebAuthnStamp {
            credential_id: self.credential_id_b64(),
            authenticator_data: to_base64url(&authenticator_data),
            client_data_json: to_base64url(client_data.as_bytes()),
            signature: to_base64url(signature.to_der().as_bytes()),
        }
    }
}

/// The challenge a passkey signs for a request body: the hex SHA-256 digest
#[must_use]
pub fn stamp_challenge(body: &str) -> String {
    to_hex(&Sha256::digest(body.as_bytes()))
}

impl Stamper for SoftwarePasskey {
    fn stamp(&self, body: &str) -> Result<Stamp, CustodyError> {
        let assertion = self.sign_assertion(stamp_challenge(body).as_bytes());
        let value = serde_json::to_string(&assertion).map_err(|e| CustodyError::Stamp(e.to_string()))?;
        Ok(Stamp {
            stamp_header_name: WEBAUTHN_STAMP_HEADER.to_string(),
            stamp_header_value: value,
        })
    }
}

/// Read the P-256 public key out of a COSE_Key
#[must_use]
pub fn verifying_key_from_cose(cose: &[u8]) -> Option<VerifyingKey> {
    let value: CborValue = ciborium::de::from_reader(cose).ok()?;
    let entries = value.as_map()?;
    let coordinate = |label: i64| {
        entries.iter().find_map(|(k, v)| {
            let key = i64::try_from(k.as_integer()?).ok()?;
            (key == label).then(|| v.as_bytes().cloned()).flatten()
        })
    };
    let mut sec1 = vec![0x04];
    sec1.extend(coordinate(COSE_X)?);
    sec1.extend(coordinate(COSE_Y)?);
    VerifyingKey::from_sec1_bytes(&sec1).ok()
}

/// Check a WebAuthn stamp over `body` against a registered credential key
/// scoped to the relying party whose ID hashes to `rp_id_hash`
#[must_use]
pub fn verify_webauthn_stamp(
    stamp: &WebAuthnStamp,
    body: &str,
    rp_id_hash: &[u8; 32],
    key: &VerifyingKey,
) -> bool {
    let (Ok(authenticator_data), Ok(client_data), Ok(signature)) = (
        from_base64url(&stamp.authenticator_data),
        from_base64url(&stamp.client_data_json),
        from_base64url(&stamp.signature),
    ) else {
        return false;
    };

    if authenticator_data.len() < 37 || authenticator_data[..32] != rp_id_hash[..] {
        return false;
    }

    let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(&client_data) else {
        return false;
    };
    let expected_challenge = to_base64url(stamp_challenge(body).as_bytes());
    if parsed["type"] != "webauthn.get" || parsed["challenge"] != expected_challenge.as_str() {
        return false;
    }

    let Ok(signature) = Signature::from_der(&signature) else {
        return false;
    };
    let mut signed = authenticator_data;
    signed.extend_from_slice(&Sha256::digest(&client_data));
    key.verify(&signed, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cose_key_round_trips() {
        let passkey = SoftwarePasskey::new("localhost", "http://localhost:8080");
        let key = verifying_key_from_cose(&passkey.cose_public_key()).unwrap();
        assert_eq!(&key, passkey.signing_key.verifying_key());
    }

    #[test]
    fn test_stamp_binds_body() {
        let passkey = SoftwarePasskey::new("localhost", "http://localhost:8080");
        let key = passkey.signing_key.verifying_key();
        let rp_id_hash = passkey.rp_id_hash();
        let foreign_rp: [u8; 32] = Sha256::digest(b"evil.example").into();
        let stamp = passkey.stamp(r#"{"a":1}"#).unwrap();
        assert_eq!(stamp.stamp_header_name, WEBAUTHN_STAMP_HEADER);

        let decoded: WebAuthnStamp = serde_json::from_str(&stamp.stamp_header_value).unwrap();
        assert!(verify_webauthn_stamp(&decoded, r#"{"a":1}"#, &rp_id_hash, key));
        assert!(!verify_webauthn_stamp(&decoded, r#"{"a":2}"#, &rp_id_hash, key));
        assert!(!verify_webauthn_stamp(&decoded, r#"{"a":1}"#, &foreign_rp, key));
    }
}
