//! Identity this process announces to brokers.

/// Client ID sent in every request header.
pub const DEFAULT_CLIENT_ID: &str = "lagwatch";

/// Crate version, logged at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
