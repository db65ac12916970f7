//! Shared helpers for the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use pgp_common::logging::{LogLevel, LoggingConfig};
use pgp_keyring::{
    canonicalize, current_unix_timestamp, CanonicalizedKeyRing, KeyFlags, KeyId,
    KeyOperationEngine, OperationLog, Passphrase, PublicKeyAlgorithm, RawKeyRing,
    SaveKeyRingRequest, SubkeyAdd,
};

pub fn init_logging() {
    LoggingConfig::new()
        .with_default_level(LogLevel::Debug)
        .for_tests()
        .apply();
}

/// A point in time `secs` seconds ago.
pub fn seconds_ago(secs: u32) -> u32 {
    current_unix_timestamp() - secs
}

pub fn engine_at(time: u32) -> KeyOperationEngine {
    KeyOperationEngine::with_defaults().with_time(time)
}

/// Ed25519 certify master, Ed25519 signing subkey, Cv25519 encryption subkey.
pub fn curve25519_request(user_ids: &[&str]) -> SaveKeyRingRequest {
    let mut request = SaveKeyRingRequest::new()
        .add_subkey(SubkeyAdd::new(PublicKeyAlgorithm::EdDsa, KeyFlags::certify()))
        .add_subkey(SubkeyAdd::new(PublicKeyAlgorithm::EdDsa, KeyFlags::sign()))
        .add_subkey(SubkeyAdd::new(PublicKeyAlgorithm::Ecdh, KeyFlags::encrypt()));
    for user_id in user_ids {
        request = request.add_user_id(*user_id);
    }
    request
}

pub fn canonical(raw: &RawKeyRing) -> Result<CanonicalizedKeyRing> {
    let mut log = OperationLog::new();
    Ok(canonicalize(raw, &mut log)?)
}

pub fn create_raw(engine: &KeyOperationEngine, request: &SaveKeyRingRequest) -> Result<RawKeyRing> {
    let result = engine.create_secret_key_ring(request);
    result
        .ring
        .ok_or_else(|| anyhow!("create failed: {:?}", result.log.errors()))
}

pub fn create_ring(
    engine: &KeyOperationEngine,
    request: &SaveKeyRingRequest,
) -> Result<CanonicalizedKeyRing> {
    canonical(&create_raw(engine, request)?)
}

pub fn modify_raw(
    engine: &KeyOperationEngine,
    ring: &CanonicalizedKeyRing,
    request: &SaveKeyRingRequest,
    passphrase: &Passphrase,
) -> Result<RawKeyRing> {
    let result = engine.modify_secret_key_ring(ring, request, passphrase);
    result
        .ring
        .ok_or_else(|| anyhow!("modify failed: {:?}", result.log.errors()))
}

pub fn modify_ring(
    engine: &KeyOperationEngine,
    ring: &CanonicalizedKeyRing,
    request: &SaveKeyRingRequest,
    passphrase: &Passphrase,
) -> Result<CanonicalizedKeyRing> {
    canonical(&modify_raw(engine, ring, request, passphrase)?)
}

pub fn subkey_with_flags(ring: &CanonicalizedKeyRing, flags: KeyFlags) -> Result<KeyId> {
    ring.subkeys()
        .iter()
        .find(|s| s.key_flags() == flags)
        .map(|s| s.key_id())
        .ok_or_else(|| anyhow!("no subkey with flags {:#04x}", flags.bits()))
}

pub fn user_id_strings(ring: &CanonicalizedKeyRing) -> Vec<String> {
    ring.user_ids()
        .iter()
        .map(|u| u.user_id().to_string_lossy())
        .collect()
}
