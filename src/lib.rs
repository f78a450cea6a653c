#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the passkey custody service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ceremony;
pub mod challenge;
pub mod custody;
pub mod handlers;
pub mod registration;
pub mod settings;
pub mod signing;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod utils;

/// Re-export commonly used items
pub use challenge::ChallengeToken;
pub use custody::{CustodyClient, HttpCustodyClient};
pub use registration::{Registration, RegistrationOrchestrator};
pub use settings::AppSettings;
pub use signing::{SignatureVerifier, SigningProxy};
