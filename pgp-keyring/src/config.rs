//! Engine configuration shared by canonicalization and key operations.

use crate::types::{HashAlgorithm, SymmetricAlgorithm};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Signatures dated further than this into the future are rejected.
pub const DEFAULT_FUTURE_TOLERANCE_SECS: u32 = 24 * 60 * 60;

/// Keys below this size are refused at generation time.
pub const DEFAULT_MIN_KEY_BITS: u32 = 512;

/// Encoded S2K iteration count: (16 + 0) << (6 + 6) = 65536 octets hashed.
pub const DEFAULT_S2K_COUNT: u8 = 0x60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyringConfig {
    /// Minimum modulus size for explicitly sized (non-curve) keys
    pub min_key_bits: u32,
    /// Accepted clock skew for signature creation times, in seconds
    pub future_tolerance_secs: u32,
    /// Encoded iteration count for newly protected secret keys
    pub s2k_count: u8,
    /// Cipher used to protect newly written secret keys
    pub protection_cipher: SymmetricAlgorithm,
    /// Digest used for new signatures and S2K
    pub hash_algorithm: HashAlgorithm,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            min_key_bits: DEFAULT_MIN_KEY_BITS,
            future_tolerance_secs: DEFAULT_FUTURE_TOLERANCE_SECS,
            s2k_count: DEFAULT_S2K_COUNT,
            protection_cipher: SymmetricAlgorithm::Aes256,
            hash_algorithm: HashAlgorithm::Sha256,
        }
    }
}

impl KeyringConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_key_bits(mut self, bits: u32) -> Self {
        self.min_key_bits = bits;
        self
    }

    pub fn with_future_tolerance(mut self, secs: u32) -> Self {
        self.future_tolerance_secs = secs;
        self
    }

    pub fn with_s2k_count(mut self, count: u8) -> Self {
        self.s2k_count = count;
        self
    }

    pub fn with_protection_cipher(mut self, cipher: SymmetricAlgorithm) -> Self {
        self.protection_cipher = cipher;
        self
    }
}

impl fmt::Display for KeyringConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KeyringConfig: min_key_bits:{} future_tolerance:{}s s2k_count:{:#04x} cipher:{:?} hash:{:?}",
            self.min_key_bits,
            self.future_tolerance_secs,
            self.s2k_count,
            self.protection_cipher,
            self.hash_algorithm
        )
    }
}
