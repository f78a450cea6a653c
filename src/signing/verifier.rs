use ed25519_dalek::{Signature, VerifyingKey};

use crate::utils::encoding::fixed_from_base58;

/// Ed25519 signature check (RFC 8032)
///
/// Bad lengths, invalid points and non-matching signatures all come out as
/// `false`; nothing here is an error.
pub struct SignatureVerifier;

impl SignatureVerifier {
    #[must_use]
    pub fn verify(payload: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(public_key) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify_strict(payload, &signature).is_ok()
    }

    /// Verify against a base58 public key, as stored in a `Registration`
    #[must_use]
    pub fn verify_base58(payload: &[u8], signature: &[u8], public_key: &str) -> bool {
        fixed_from_base58::<32>(public_key)
            .is_some_and(|key| Self::verify(payload, signature, &key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::random_bytes;
    use crate::utils::encoding::to_base58;
    use ed25519_dalek::{Signer, SigningKey};

    fn key() -> SigningKey {
        SigningKey::from_bytes(&random_bytes::<32>())
    }

    #[test]
    fn test_accepts_valid_signatures() {
        let key = key();
        let public_key = key.verifying_key().to_bytes();
        for len in [0usize, 1, 32, 64, 1232] {
            let payload = vec![0xA5; len];
            let signature = key.sign(&payload).to_bytes();
            assert!(SignatureVerifier::verify(&payload, &signature, &public_key));
            assert!(SignatureVerifier::verify_base58(
                &payload,
                &signature,
                &to_base58(&public_key)
            ));
        }
    }

    #[test]
    fn test_rejects_tampering() {
        let key = key();
        let public_key = key.verifying_key().to_bytes();
        let payload = b"transfer 1 SOL".to_vec();
        let signature = key.sign(&payload).to_bytes();

        let mut bad_signature = signature;
        bad_signature[10] ^= 0x01;
        assert!(!SignatureVerifier::verify(&payload, &bad_signature, &public_key));

        let mut bad_payload = payload.clone();
        bad_payload[0] ^= 0x01;
        assert!(!SignatureVerifier::verify(&bad_payload, &signature, &public_key));

        let other = super::tests::key().verifying_key().to_bytes();
        assert!(!SignatureVerifier::verify(&payload, &signature, &other));
    }

    #[test]
    fn test_bad_lengths_are_false_not_errors() {
        let key = key();
        let public_key = key.verifying_key().to_bytes();
        let signature = key.sign(b"x").to_bytes();

        assert!(!SignatureVerifier::verify(b"x", &signature[..63], &public_key));
        assert!(!SignatureVerifier::verify(b"x", &[], &public_key));
        assert!(!SignatureVerifier::verify(b"x", &signature, &public_key[..31]));
        assert!(!SignatureVerifier::verify_base58(b"x", &signature, "not-base58-0OIl"));
        assert!(!SignatureVerifier::verify_base58(b"x", &signature, ""));
    }

    #[test]
    fn test_ed25519_is_deterministic() {
        let key = key();
        assert_eq!(key.sign(b"same").to_bytes(), key.sign(b"same").to_bytes());
    }
}
