//! Key-custody service integration
//!
//! The custody service holds the signing keys. Every mutating call is an
//! asynchronous *activity* that has to be polled until it settles, and every
//! request carries a stamp authenticating its body.

mod client;
mod errors;
mod poll;
mod stamp;
pub mod types;

pub use client::{CustodyClient, HttpCustodyClient};
pub use errors::CustodyError;
pub use poll::{bounded, poll_activity, poll_until, PollError, PollPolicy, DEFAULT_POLL_DEADLINE, DEFAULT_POLL_INTERVAL};
pub use stamp::{
    ApiKeyStampPayload, ApiKeyStamper, Stamper, API_KEY_SIGNATURE_SCHEME, API_KEY_STAMP_HEADER,
    WEBAUTHN_STAMP_HEADER,
};
pub use types::{Activity, ActivityStatus, RootQuorum, SignedRequest, Stamp, UnsignedRequest, User};
