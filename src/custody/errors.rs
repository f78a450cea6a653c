use thiserror::Error;

/// Failures talking to the key-custody service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error("custody service unreachable: {0}")]
    Transport(String),

    #[error("custody service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("custody response could not be decoded: {0}")]
    Decode(String),

    #[error("request stamping failed: {0}")]
    Stamp(String),

    #[error("custody client misconfigured: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for CustodyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CustodyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
