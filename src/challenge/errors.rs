use thiserror::Error;

/// Reasons a challenge token is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    /// Decoding or authentication failed. Wrong key, tampering and malformed
    /// input all collapse into this one shape.
    #[error("challenge is forged or corrupt")]
    ForgedOrCorrupt,

    /// The token was issued for a different protocol stage
    #[error("challenge was issued for stage '{actual}', expected '{expected}'")]
    WrongStage { expected: String, actual: String },

    /// The token is older than the configured timeout
    #[error("challenge expired {overdue_ms} ms ago")]
    Expired { overdue_ms: i64 },
}
