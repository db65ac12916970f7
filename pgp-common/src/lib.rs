//! PGP Common
//!
//! Common utilities shared by the OpenPGP keyring crates.
//!
//! This crate provides:
//! - Component-based structured logging with key context
//! - Logging configuration on top of `env_logger`
//! - Hex helpers for key identifiers used in log prefixes

pub mod logging;

pub use logging::{Component, LogLevel, Logger, LoggingConfig};

/// Utility module for compact key identifiers in log output
pub mod compact_ids {
    /// Render the trailing eight bytes of an identifier as upper-case hex.
    ///
    /// Key ids and fingerprints both end in the key id, so this yields the
    /// same 16-character label for either input.
    pub fn short_key_label(id_bytes: &[u8]) -> String {
        let start = id_bytes.len().saturating_sub(8);
        hex::encode_upper(&id_bytes[start..])
    }

}
