pub mod crypto;
pub mod encoding;
pub mod logging;
pub mod responses;
