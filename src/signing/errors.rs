use thiserror::Error;

use crate::custody::{ActivityStatus, CustodyError, PollError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("signing activity {activity_id} completed without a usable signRawPayloadResult")]
    MissingResult { activity_id: String },

    #[error("signing activity {activity_id} ended with {status}")]
    OperationRejected {
        activity_id: String,
        status: ActivityStatus,
    },

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("signature from activity {activity_id} does not verify")]
    VerificationFailed { activity_id: String },

    #[error("malformed signing request: {0}")]
    MalformedRequest(String),
}
