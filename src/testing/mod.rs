//! Testing utilities for passkey custody
//!
//! Everything needed to run the registration and signing flows without a
//! browser or a live custody service.
//!
//! ## Organization
//!
//! - [`passkey`] - A software passkey that attests and stamps like a browser
//! - [`fixtures`] - Ceremony responses and ready-to-use settings
//! - [`mock`] - An in-memory custody service
//!
//! ## Usage
//!
//! ```rust
//! use passkey_custody::testing::fixtures::TestFixtures;
//!
//! let fixture = TestFixtures::attestation();
//! let response = fixture.browser_response("challenge-token");
//! assert_eq!(response["type"], "public-key");
//! ```

pub mod fixtures;
pub mod mock;
pub mod passkey;

pub use fixtures::{AttestationFixture, TestFixtures};
pub use mock::{MockBehavior, MockCustody};
pub use passkey::SoftwarePasskey;

/// Common test constants
pub mod constants {
    /// Relying party ID used by fixtures
    pub const TEST_RP_ID: &str = "localhost";

    /// Origin the fixture passkey claims
    pub const TEST_RP_ORIGIN: &str = "http://localhost:8080";

    /// Parent organization named in fixture settings
    pub const TEST_ORGANIZATION_ID: &str = "org-test-parent";
}
