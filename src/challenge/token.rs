use std::fmt;
use std::time::Duration;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::ChallengeError;
use crate::utils::crypto::{random_bytes, ENCRYPTION_KEY_SIZE};
use crate::utils::encoding::{from_base64url, to_base64url};

/// Stage tag for passkey registration ceremonies
pub const REGISTER_STAGE: &str = "register";

/// How long an issued challenge stays valid (60 seconds)
pub const DEFAULT_CHALLENGE_TIMEOUT_MS: u64 = 60_000;

/// AES-GCM nonce length (96 bits), prefixed to every token
const NONCE_SIZE: usize = 12;

/// Plaintext sealed inside a challenge token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    #[serde(rename = "type")]
    pub stage: String,
    #[serde(rename = "timestamp")]
    pub issued_at_millis: i64,
}

/// Issues and verifies self-contained, encrypted challenge tokens
#[derive(Clone)]
pub struct ChallengeToken {
    key: [u8; ENCRYPTION_KEY_SIZE],
    timeout_ms: i64,
}

impl fmt::Debug for ChallengeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeToken")
            .field("key", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ChallengeToken {
    #[must_use]
    pub fn new(key: [u8; ENCRYPTION_KEY_SIZE], timeout: Duration) -> Self {
        Self {
            key,
            timeout_ms: i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.timeout_ms).unwrap_or(0))
    }

    /// Issue a token for `stage` stamped with the current time
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be sealed
    pub fn issue(&self, stage: &str) -> anyhow::Result<String> {
        self.issue_at(stage, Utc::now().timestamp_millis())
    }

    /// Issue a token for `stage` stamped with `now_millis`
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be sealed
    pub fn issue_at(&self, stage: &str, now_millis: i64) -> anyhow::Result<String> {
        let record = ChallengeRecord {
            stage: stage.to_string(),
            issued_at_millis: now_millis,
        };
        self.seal(&record)
    }

    /// Verify a token against the expected stage at the current time
    ///
    /// # Errors
    ///
    /// - `ForgedOrCorrupt` if the token does not authenticate or decode
    /// - `WrongStage` if it was issued for another stage
    /// - `Expired` if its window has passed
    pub fn verify(&self, expected_stage: &str, token: &str) -> Result<ChallengeRecord, ChallengeError> {
        self.verify_at(expected_stage, token, Utc::now().timestamp_millis())
    }

    /// Verify a token against the expected stage at `now_millis`
    ///
    /// # Errors
    ///
    /// Same as [`ChallengeToken::verify`]
    pub fn verify_at(
        &self,
        expected_stage: &str,
        token: &str,
        now_millis: i64,
    ) -> Result<ChallengeRecord, ChallengeError> {
        let record = self.open(token)?;

        if record.stage != expected_stage {
            return Err(ChallengeError::WrongStage {
                expected: expected_stage.to_string(),
                actual: record.stage,
            });
        }

        let deadline = record.issued_at_millis.saturating_add(self.timeout_ms);
        if now_millis > deadline {
            return Err(ChallengeError::Expired {
                overdue_ms: now_millis - deadline,
            });
        }

        Ok(record)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    /// `base64url(nonce ‖ AES-256-GCM(json(record)))` under a fresh nonce
    fn seal(&self, record: &ChallengeRecord) -> anyhow::Result<String> {
        let plaintext = serde_json::to_vec(record).context("Failed to serialize challenge record")?;

        // Nonce reuse under one key breaks GCM
        let nonce: [u8; NONCE_SIZE] = random_bytes();
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(to_base64url(&sealed))
    }

    /// Inverse of [`ChallengeToken::seal`]; every failure has the same shape
    fn open(&self, token: &str) -> Result<ChallengeRecord, ChallengeError> {
        let sealed = from_base64url(token).map_err(|_| ChallengeError::ForgedOrCorrupt)?;
        if sealed.len() < NONCE_SIZE {
            return Err(ChallengeError::ForgedOrCorrupt);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ChallengeError::ForgedOrCorrupt)?;
        serde_json::from_slice(&plaintext).map_err(|_| ChallengeError::ForgedOrCorrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::generate_encryption_key;

    const NOW: i64 = 1_700_000_000_000;

    fn token_service() -> ChallengeToken {
        ChallengeToken::new(
            generate_encryption_key(),
            Duration::from_millis(DEFAULT_CHALLENGE_TIMEOUT_MS),
        )
    }

    #[test]
    fn test_fresh_token_verifies() {
        let challenges = token_service();
        for stage in ["register", "other", "", "ünïcödé stage"] {
            let token = challenges.issue_at(stage, NOW).unwrap();
            let record = challenges.verify_at(stage, &token, NOW).unwrap();
            assert_eq!(record.stage, stage);
            assert_eq!(record.issued_at_millis, NOW);
        }
    }

    #[test]
    fn test_issue_uses_wall_clock() {
        let challenges = token_service();
        let token = challenges.issue(REGISTER_STAGE).unwrap();
        assert!(challenges.verify(REGISTER_STAGE, &token).is_ok());
    }

    #[test]
    fn test_window_boundary() {
        let challenges = token_service();
        let token = challenges.issue_at(REGISTER_STAGE, NOW).unwrap();
        let timeout = i64::try_from(DEFAULT_CHALLENGE_TIMEOUT_MS).unwrap();

        assert!(challenges
            .verify_at(REGISTER_STAGE, &token, NOW + timeout)
            .is_ok());
        assert_eq!(
            challenges.verify_at(REGISTER_STAGE, &token, NOW + timeout + 1),
            Err(ChallengeError::Expired { overdue_ms: 1 })
        );
    }

    #[test]
    fn test_custom_timeouts() {
        for timeout_ms in [1_u64, 500, 60_000, 3_600_000] {
            let challenges =
                ChallengeToken::new(generate_encryption_key(), Duration::from_millis(timeout_ms));
            let token = challenges.issue_at(REGISTER_STAGE, NOW).unwrap();
            let timeout = i64::try_from(timeout_ms).unwrap();

            assert!(challenges.verify_at(REGISTER_STAGE, &token, NOW).is_ok());
            assert!(matches!(
                challenges.verify_at(REGISTER_STAGE, &token, NOW + timeout + 1),
                Err(ChallengeError::Expired { .. })
            ));
        }
    }

    #[test]
    fn test_wrong_stage() {
        let challenges = token_service();
        let token = challenges.issue_at("other", NOW).unwrap();
        assert_eq!(
            challenges.verify_at(REGISTER_STAGE, &token, NOW),
            Err(ChallengeError::WrongStage {
                expected: REGISTER_STAGE.to_string(),
                actual: "other".to_string(),
            })
        );
    }

    #[test]
    fn test_every_single_bit_flip_is_detected() {
        let challenges = token_service();
        let token = challenges.issue_at(REGISTER_STAGE, NOW).unwrap();
        let original = token.as_bytes();

        for index in 0..original.len() {
            for bit in 0..8 {
                let mut tampered = original.to_vec();
                tampered[index] ^= 1 << bit;
                let tampered = String::from_utf8_lossy(&tampered);
                assert_eq!(
                    challenges.verify_at(REGISTER_STAGE, &tampered, NOW),
                    Err(ChallengeError::ForgedOrCorrupt),
                    "flip of bit {bit} in byte {index} went unnoticed"
                );
            }
        }
    }

    #[test]
    fn test_foreign_key_and_garbage_are_indistinguishable() {
        let challenges = token_service();
        let foreign = token_service().issue_at(REGISTER_STAGE, NOW).unwrap();

        for token in [foreign.as_str(), "", "not base64!", "AAAA", "QUJD"] {
            assert_eq!(
                challenges.verify_at(REGISTER_STAGE, token, NOW),
                Err(ChallengeError::ForgedOrCorrupt)
            );
        }
    }

    #[test]
    fn test_repeated_issuance_yields_distinct_tokens() {
        let challenges = token_service();
        let first = challenges.issue_at(REGISTER_STAGE, NOW).unwrap();
        let second = challenges.issue_at(REGISTER_STAGE, NOW + 5_000).unwrap();
        assert_ne!(first, second);

        assert_eq!(
            challenges
                .verify_at(REGISTER_STAGE, &first, NOW)
                .unwrap()
                .issued_at_millis,
            NOW
        );
        assert_eq!(
            challenges
                .verify_at(REGISTER_STAGE, &second, NOW + 5_000)
                .unwrap()
                .issued_at_millis,
            NOW + 5_000
        );

        // Each token lives in its own window
        let timeout = i64::try_from(DEFAULT_CHALLENGE_TIMEOUT_MS).unwrap();
        let later = NOW + timeout + 1;
        assert!(challenges.verify_at(REGISTER_STAGE, &first, later).is_err());
        assert!(challenges.verify_at(REGISTER_STAGE, &second, later).is_ok());
    }

    #[test]
    fn test_token_is_transport_safe() {
        let token = token_service().issue_at(REGISTER_STAGE, NOW).unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_authentic_but_unexpected_plaintext_is_corrupt() {
        let challenges = token_service();
        let nonce = [7u8; NONCE_SIZE];
        let ciphertext = challenges
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), br#"{"unexpected":true}"#.as_slice())
            .unwrap();
        let token = to_base64url(&[nonce.as_slice(), ciphertext.as_slice()].concat());

        assert_eq!(
            challenges.verify_at(REGISTER_STAGE, &token, NOW),
            Err(ChallengeError::ForgedOrCorrupt)
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", token_service());
        assert!(rendered.contains("<redacted>"));
    }
}
