//! Edit request value types.
//!
//! Requests are plain values built once per call; the engine never mutates
//! them.

use crate::keyring::{CanonicalizedKeyRing, RawKeyRing};
use crate::oplog::OperationLog;
use crate::types::{Curve, Fingerprint, KeyFlags, KeyId, PublicKeyAlgorithm};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// A passphrase held for the duration of one call and zeroized on drop.
#[derive(Clone, Default)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// The empty passphrase: secret keys are stored unencrypted.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// A subkey to generate. The first entry of a create request is the master
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubkeyAdd {
    pub algorithm: PublicKeyAlgorithm,
    /// Modulus size for RSA and DSA
    pub key_size: Option<u32>,
    /// Curve for ECDSA, EdDSA and ECDH; a default is chosen when absent
    pub curve: Option<Curve>,
    pub flags: KeyFlags,
    /// Absolute expiry time in seconds since the epoch, 0 for none
    pub expiry: u32,
}

impl SubkeyAdd {
    pub fn new(algorithm: PublicKeyAlgorithm, flags: KeyFlags) -> Self {
        Self {
            algorithm,
            key_size: None,
            curve: None,
            flags,
            expiry: 0,
        }
    }

    pub fn with_key_size(mut self, bits: u32) -> Self {
        self.key_size = Some(bits);
        self
    }

    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.curve = Some(curve);
        self
    }

    pub fn with_expiry(mut self, expiry: u32) -> Self {
        self.expiry = expiry;
        self
    }
}

/// New flags and/or expiry for an existing key. Fields left `None` keep
/// their current value, so a change with neither re-binds the key as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubkeyChange {
    pub key_id: KeyId,
    pub flags: Option<KeyFlags>,
    /// Absolute expiry time, `Some(0)` removes the expiry
    pub expiry: Option<u32>,
}

impl SubkeyChange {
    pub fn new(key_id: KeyId) -> Self {
        Self {
            key_id,
            flags: None,
            expiry: None,
        }
    }

    pub fn with_flags(mut self, flags: KeyFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_expiry(mut self, expiry: u32) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

/// Structured edit request for creating or modifying a secret keyring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveKeyRingRequest {
    /// Must match the ring being modified
    pub master_key_id: Option<KeyId>,
    /// Must match the ring being modified
    pub fingerprint: Option<Fingerprint>,
    pub add_subkeys: Vec<SubkeyAdd>,
    pub change_subkeys: Vec<SubkeyChange>,
    pub revoke_subkeys: Vec<KeyId>,
    pub add_user_ids: Vec<String>,
    pub revoke_user_ids: Vec<String>,
    /// On create: the primary user id among `add_user_ids`
    pub change_primary_user_id: Option<String>,
    #[serde(skip)]
    pub new_passphrase: Option<Passphrase>,
}

impl SaveKeyRingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request addressed to `ring`, with its key id and fingerprint set.
    pub fn for_ring(ring: &CanonicalizedKeyRing) -> Self {
        Self {
            master_key_id: Some(ring.master_key_id()),
            fingerprint: Some(ring.fingerprint()),
            ..Self::default()
        }
    }

    pub fn add_subkey(mut self, subkey: SubkeyAdd) -> Self {
        self.add_subkeys.push(subkey);
        self
    }

    pub fn change_subkey(mut self, change: SubkeyChange) -> Self {
        self.change_subkeys.push(change);
        self
    }

    pub fn revoke_subkey(mut self, key_id: KeyId) -> Self {
        self.revoke_subkeys.push(key_id);
        self
    }

    pub fn add_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.add_user_ids.push(user_id.into());
        self
    }

    pub fn revoke_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.revoke_user_ids.push(user_id.into());
        self
    }

    pub fn primary_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.change_primary_user_id = Some(user_id.into());
        self
    }

    pub fn passphrase(mut self, passphrase: Passphrase) -> Self {
        self.new_passphrase = Some(passphrase);
        self
    }
}

/// Outcome of a key operation. A ring is present only if no action failed.
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub ring: Option<RawKeyRing>,
    pub log: OperationLog,
}

impl OperationResult {
    pub(crate) fn success(ring: RawKeyRing, log: OperationLog) -> Self {
        Self {
            ring: Some(ring),
            log,
        }
    }

    pub(crate) fn failure(log: OperationLog) -> Self {
        Self { ring: None, log }
    }

    pub fn is_ok(&self) -> bool {
        self.ring.is_some()
    }
}
