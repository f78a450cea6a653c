// Key material for the stateless challenge tokens

use anyhow::{anyhow, Context, Result};
use rand::RngCore;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Fill a fixed-size array from the thread-local CSPRNG
#[must_use]
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a fresh AES-256 key
#[must_use]
pub fn generate_encryption_key() -> [u8; ENCRYPTION_KEY_SIZE] {
    random_bytes()
}

/// Parse a hex-encoded AES-256 key
///
/// # Errors
///
/// Returns an error if the input is not hex or does not decode to exactly 32 bytes
pub fn parse_encryption_key(hex_key: &str) -> Result<[u8; ENCRYPTION_KEY_SIZE]> {
    let bytes = hex::decode(hex_key.trim()).context("Encryption key is not valid hex")?;
    <[u8; ENCRYPTION_KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
        anyhow!(
            "Invalid key length: expected {} bytes, got {}",
            ENCRYPTION_KEY_SIZE,
            bytes.len()
        )
    })
}
