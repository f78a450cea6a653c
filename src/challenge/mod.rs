//! Stateless registration challenges
//!
//! A challenge is an AES-256-GCM sealed record of its intended stage and
//! issuance time. The server keeps no per-challenge state: a token either
//! authenticates under the process key and is inside its window, or it is
//! rejected.

mod errors;
mod token;

pub use errors::ChallengeError;
pub use token::{ChallengeRecord, ChallengeToken, DEFAULT_CHALLENGE_TIMEOUT_MS, REGISTER_STAGE};
