//! Request stamping
//!
//! Every request to the custody service carries a stamp: a signature over the
//! exact request body, placed in a header. The server stamps its own
//! bootstrap requests with its P-256 API key; requests a user authorizes are
//! stamped in the browser by their passkey and only forwarded here.

use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};

use super::errors::CustodyError;
use super::types::Stamp;
use crate::utils::crypto::random_bytes;
use crate::utils::encoding::{from_hex, to_base64url, to_hex};

pub const API_KEY_STAMP_HEADER: &str = "X-Stamp";
pub const WEBAUTHN_STAMP_HEADER: &str = "X-Stamp-WebAuthn";
pub const API_KEY_SIGNATURE_SCHEME: &str = "SIGNATURE_SCHEME_TK_API_P256";

/// Produces the authentication stamp for a request body
pub trait Stamper: Send + Sync {
    /// # Errors
    ///
    /// Returns `CustodyError::Stamp` if the body cannot be signed
    fn stamp(&self, body: &str) -> Result<Stamp, CustodyError>;
}

/// Decoded contents of an `X-Stamp` header
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyStampPayload {
    pub public_key: String, // compressed SEC1, hex
    pub signature: String,  // DER, hex
    pub scheme: String,
}

/// Stamps requests with a P-256 API key
#[derive(Clone)]
pub struct ApiKeyStamper {
    signing_key: SigningKey,
    public_key_hex: String,
}

impl std::fmt::Debug for ApiKeyStamper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyStamper")
            .field("public_key", &self.public_key_hex)
            .finish_non_exhaustive()
    }
}

impl ApiKeyStamper {
    /// Load a stamper from a hex-encoded P-256 private scalar
    ///
    /// # Errors
    ///
    /// Returns `CustodyError::Configuration` if the key is not a valid scalar
    pub fn from_hex(private_key_hex: &str) -> Result<Self, CustodyError> {
        let bytes = from_hex(private_key_hex.trim())
            .map_err(|_| CustodyError::Configuration("API private key is not hex".into()))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|_| CustodyError::Configuration("API private key is not a P-256 scalar".into()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Load a stamper and check it matches the configured public key
    ///
    /// # Errors
    ///
    /// Returns `CustodyError::Configuration` if the key is invalid or the
    /// public halves disagree
    pub fn from_key_pair(private_key_hex: &str, public_key_hex: &str) -> Result<Self, CustodyError> {
        let stamper = Self::from_hex(private_key_hex)?;
        if !stamper
            .public_key_hex
            .eq_ignore_ascii_case(public_key_hex.trim())
        {
            return Err(CustodyError::Configuration(
                "API public key does not match the private key".into(),
            ));
        }
        Ok(stamper)
    }

    /// Fresh random key pair, for local development and tests
    #[must_use]
    pub fn generate() -> Self {
        loop {
            // Out-of-range scalars are astronomically rare; draw again
            if let Ok(signing_key) = SigningKey::from_slice(&random_bytes::<32>()) {
                return Self::from_signing_key(signing_key);
            }
        }
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key_hex = to_hex(
            signing_key
                .verifying_key()
                .as_affine()
                .to_encoded_point(true)
                .as_bytes(),
        );
        Self {
            signing_key,
            public_key_hex,
        }
    }

    /// Compressed public key, hex encoded
    #[must_use]
    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }

    /// Private scalar, hex encoded
    #[must_use]
    pub fn private_key_hex(&self) -> String {
        to_hex(&self.signing_key.to_bytes())
    }
}

impl Stamper for ApiKeyStamper {
    fn stamp(&self, body: &str) -> Result<Stamp, CustodyError> {
        let signature: Signature = self.signing_key.sign(body.as_bytes());
        let payload = ApiKeyStampPayload {
            public_key: self.public_key_hex.clone(),
            signature: to_hex(signature.to_der().as_bytes()),
            scheme: API_KEY_SIGNATURE_SCHEME.to_string(),
        };
        let json = serde_json::to_vec(&payload).map_err(|e| CustodyError::Stamp(e.to_string()))?;

        Ok(Stamp {
            stamp_header_name: API_KEY_STAMP_HEADER.to_string(),
            stamp_header_value: to_base64url(&json),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::encoding::from_base64url;
    use p256::ecdsa::{signature::Verifier, VerifyingKey};

    fn decode(stamp: &Stamp) -> ApiKeyStampPayload {
        serde_json::from_slice(&from_base64url(&stamp.stamp_header_value).unwrap()).unwrap()
    }

    #[test]
    fn test_stamp_verifies_over_exact_body() {
        let stamper = ApiKeyStamper::generate();
        let body = r#"{"organizationId":"org-1"}"#;
        let stamp = stamper.stamp(body).unwrap();
        assert_eq!(stamp.stamp_header_name, API_KEY_STAMP_HEADER);

        let payload = decode(&stamp);
        assert_eq!(payload.scheme, API_KEY_SIGNATURE_SCHEME);
        assert_eq!(payload.public_key, stamper.public_key_hex());

        let verifying_key =
            VerifyingKey::from_sec1_bytes(&from_hex(&payload.public_key).unwrap()).unwrap();
        let signature = Signature::from_der(&from_hex(&payload.signature).unwrap()).unwrap();
        assert!(verifying_key.verify(body.as_bytes(), &signature).is_ok());
        assert!(verifying_key.verify(b"{}", &signature).is_err());
    }

    #[test]
    fn test_compressed_public_key() {
        let stamper = ApiKeyStamper::generate();
        assert_eq!(stamper.public_key_hex().len(), 66);
        assert!(stamper.public_key_hex().starts_with("02") || stamper.public_key_hex().starts_with("03"));
    }

    #[test]
    fn test_load_from_hex() {
        let original = ApiKeyStamper::generate();
        let loaded = ApiKeyStamper::from_key_pair(&original.private_key_hex(), original.public_key_hex()).unwrap();
        assert_eq!(loaded.public_key_hex(), original.public_key_hex());

        let other = ApiKeyStamper::generate();
        assert!(matches!(
            ApiKeyStamper::from_key_pair(&original.private_key_hex(), other.public_key_hex()),
            Err(CustodyError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_bad_private_keys() {
        let zero = "00".repeat(32);
        let above_order = "ff".repeat(32);
        for key in ["", "zz", "00", zero.as_str(), above_order.as_str()] {
            assert!(
                matches!(ApiKeyStamper::from_hex(key), Err(CustodyError::Configuration(_))),
                "accepted {key:?}"
            );
        }
    }
}
