//! Transport encodings used across the custody protocol
//!
//! Payloads travel to the custody service as lowercase hex, public keys are
//! handed to clients in base58 (Solana address form) and `WebAuthn` blobs are
//! base64url without padding.

use base64::{engine::general_purpose, Engine as _};

/// Lowercase hex encoding of raw bytes
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex into bytes, accepting either case
///
/// # Errors
///
/// Returns an error if the input has odd length or non-hex characters
pub fn from_hex(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(value)
}

/// Decode exactly `N` bytes of hex
#[must_use]
pub fn fixed_from_hex<const N: usize>(value: &str) -> Option<[u8; N]> {
    let bytes = hex::decode(value).ok()?;
    <[u8; N]>::try_from(bytes.as_slice()).ok()
}

#[must_use]
pub fn to_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode exactly `N` bytes of base58
#[must_use]
pub fn fixed_from_base58<const N: usize>(value: &str) -> Option<[u8; N]> {
    let bytes = bs58::decode(value).into_vec().ok()?;
    <[u8; N]>::try_from(bytes.as_slice()).ok()
}

#[must_use]
pub fn to_base64url(bytes: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, tolerating padded input from older browsers
///
/// # Errors
///
/// Returns an error if the input is not base64url
pub fn from_base64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_is_lowercase() {
        assert_eq!(to_hex(&[0xAB, 0x01, 0xFF]), "ab01ff");
        assert_eq!(from_hex("AB01ff").unwrap(), vec![0xAB, 0x01, 0xFF]);
    }

    #[test]
    fn test_fixed_width_decoding() {
        assert_eq!(fixed_from_hex::<2>("0102"), Some([1, 2]));
        assert_eq!(fixed_from_hex::<2>("010203"), None);
        assert_eq!(fixed_from_hex::<2>("zz"), None);

        let encoded = to_base58(&[7u8; 32]);
        assert_eq!(fixed_from_base58::<32>(&encoded), Some([7u8; 32]));
        assert_eq!(fixed_from_base58::<31>(&encoded), None);
        assert_eq!(fixed_from_base58::<32>("0OIl"), None);
    }

    #[test]
    fn test_base64url_tolerates_padding() {
        let encoded = to_base64url(b"ab");
        assert_eq!(encoded, "YWI");
        assert_eq!(from_base64url("YWI=").unwrap(), b"ab");
        assert!(from_base64url("YW+/").is_err());
    }
}
