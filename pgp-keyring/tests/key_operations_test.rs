//! Key creation and modification through `KeyOperationEngine`.

mod common;

use anyhow::{anyhow, Result};
use common::*;
use pgp_keyring::crypto::unlock_secret;
use pgp_keyring::packet::SignatureKind;
use pgp_keyring::{
    current_unix_timestamp, Curve, KeyFlags, KeyOperationEngine, KeyringConfig, KeyringError,
    LogType, Passphrase, PublicKeyAlgorithm, SaveKeyRingRequest, SubkeyAdd, SubkeyChange,
};
use std::sync::Arc;

#[test]
fn test_create_rsa_ring_with_two_user_ids() -> Result<()> {
    init_logging();
    let engine = KeyOperationEngine::with_defaults();
    let request = SaveKeyRingRequest::new()
        .add_subkey(
            SubkeyAdd::new(PublicKeyAlgorithm::RsaEncryptSign, KeyFlags::certify())
                .with_key_size(1024),
        )
        .add_subkey(
            SubkeyAdd::new(PublicKeyAlgorithm::RsaEncryptSign, KeyFlags::sign())
                .with_key_size(1024),
        )
        .add_subkey(
            SubkeyAdd::new(PublicKeyAlgorithm::RsaEncryptSign, KeyFlags::encrypt())
                .with_key_size(1024),
        )
        .add_user_id("a")
        .add_user_id("b")
        .passphrase(Passphrase::empty());

    let result = engine.create_secret_key_ring(&request);
    assert!(result.is_ok(), "errors: {:?}", result.log.errors());
    assert!(result.log.contains(LogType::CreateSuccess));
    let raw = result.ring.ok_or_else(|| anyhow!("no ring"))?;
    let ring = canonical(&raw)?;

    assert_eq!(ring.packets().len(), 9);
    assert!(ring.is_secret());
    assert_eq!(ring.master_key().algorithm(), PublicKeyAlgorithm::RsaEncryptSign);
    assert_eq!(ring.master_key().bit_size(), Some(1024));
    assert_eq!(user_id_strings(&ring), vec!["a", "b"]);
    assert_eq!(ring.primary_user_id().user_id().to_string_lossy(), "a");
    assert!(ring.key_flags().can_certify());
    assert_eq!(ring.subkeys().len(), 2);
    subkey_with_flags(&ring, KeyFlags::sign())?;
    subkey_with_flags(&ring, KeyFlags::encrypt())?;

    // Empty passphrase: secrets stored in the clear.
    let secret = ring
        .master_secret_key()
        .ok_or_else(|| anyhow!("no master secret"))?;
    assert!(!secret.is_encrypted());
    println!("   ✅ RSA ring {} created", ring.fingerprint());
    Ok(())
}

#[test]
fn test_create_rejects_elgamal_master() -> Result<()> {
    init_logging();
    let engine = KeyOperationEngine::with_defaults();
    let request = SaveKeyRingRequest::new()
        .add_subkey(SubkeyAdd::new(
            PublicKeyAlgorithm::ElGamalEncrypt,
            KeyFlags::certify(),
        ))
        .add_user_id("a");

    let result = engine.create_secret_key_ring(&request);
    assert!(result.ring.is_none());
    assert!(result.log.contains(LogType::MasterKeyAlgorithmInvalid));
    assert!(!result.log.contains(LogType::CreateSuccess));
    Ok(())
}

#[test]
fn test_create_reports_every_validation_problem() -> Result<()> {
    init_logging();
    let engine = KeyOperationEngine::with_defaults();

    let result = engine.create_secret_key_ring(&SaveKeyRingRequest::new());
    assert!(result.ring.is_none());
    assert_eq!(
        result.log.errors(),
        vec![LogType::MissingSubkey, LogType::MissingUserId]
    );

    let request = SaveKeyRingRequest::new()
        .add_subkey(SubkeyAdd::new(PublicKeyAlgorithm::EdDsa, KeyFlags::sign()))
        .add_subkey(
            SubkeyAdd::new(PublicKeyAlgorithm::RsaEncryptSign, KeyFlags::encrypt())
                .with_key_size(256),
        )
        .add_subkey(SubkeyAdd::new(PublicKeyAlgorithm::EdDsa, KeyFlags::sign()).with_expiry(1))
        .add_subkey(SubkeyAdd::new(PublicKeyAlgorithm::Unknown(99), KeyFlags::sign()))
        .add_user_id("");
    let result = engine.create_secret_key_ring(&request);
    assert!(result.ring.is_none());
    let errors = result.log.errors();
    for expected in [
        LogType::MasterKeyNoCertifyFlag,
        LogType::KeyTooSmall,
        LogType::ExpiryInPast,
        LogType::UnknownAlgorithm,
        LogType::EmptyUserId,
    ] {
        assert!(errors.contains(&expected), "missing {expected} in {errors:?}");
    }

    let request = SaveKeyRingRequest::new()
        .add_subkey(SubkeyAdd::new(PublicKeyAlgorithm::EdDsa, KeyFlags::certify()))
        .add_subkey(
            SubkeyAdd::new(PublicKeyAlgorithm::Ecdh, KeyFlags::encrypt())
                .with_curve(Curve::Ed25519),
        )
        .add_user_id("a");
    let result = engine.create_secret_key_ring(&request);
    assert_eq!(result.log.errors(), vec![LogType::AlgorithmUnsupported]);
    Ok(())
}

#[test]
fn test_create_marks_requested_primary_and_expiry() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let expiry = t0 + 86_400;
    let mut request = curve25519_request(&["a", "b"]).primary_user_id("b");
    request.add_subkeys[0].expiry = expiry;
    request.add_subkeys[2].expiry = expiry;

    let ring = create_ring(&engine_at(t0), &request)?;
    assert_eq!(ring.primary_user_id().user_id().to_string_lossy(), "b");
    assert_eq!(ring.key_expiration(), Some(86_400));
    assert_eq!(ring.expiry(), Some(expiry));
    let encrypt = ring
        .subkey(subkey_with_flags(&ring, KeyFlags::encrypt())?)
        .ok_or_else(|| anyhow!("encryption subkey missing"))?;
    assert_eq!(encrypt.expiry(), Some(expiry));
    Ok(())
}

#[test]
fn test_revoked_subkey_is_restored_by_rebinding() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let ring = create_ring(&engine_at(t0), &curve25519_request(&["a"]))?;
    let encrypt_id = subkey_with_flags(&ring, KeyFlags::encrypt())?;
    let empty = Passphrase::empty();

    let request = SaveKeyRingRequest::for_ring(&ring).revoke_subkey(encrypt_id);
    let revoked = modify_ring(&engine_at(t0 + 10), &ring, &request, &empty)?;
    let info = revoked
        .subkey(encrypt_id)
        .ok_or_else(|| anyhow!("revoked subkey dropped"))?;
    assert!(info.is_revoked());

    let request = SaveKeyRingRequest::for_ring(&revoked).change_subkey(SubkeyChange::new(encrypt_id));
    let result = engine_at(t0 + 10).modify_secret_key_ring(&revoked, &request, &empty);
    assert!(result.log.contains(LogType::SubkeyChanged));
    let raw = result.ring.ok_or_else(|| anyhow!("rebinding failed"))?;
    let mut log = pgp_keyring::OperationLog::new();
    let restored = pgp_keyring::canonicalize(&raw, &mut log)?;
    assert!(log.contains(LogType::SubkeyRevocationOutdated));

    let info = restored
        .subkey(encrypt_id)
        .ok_or_else(|| anyhow!("restored subkey dropped"))?;
    assert!(!info.is_revoked());
    assert_eq!(info.key_flags(), KeyFlags::encrypt());
    assert!(info.binding().creation_time() > t0 + 10);
    Ok(())
}

#[test]
fn test_revoked_user_id_cannot_become_primary() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let ring = create_ring(&engine_at(t0), &curve25519_request(&["a", "b"]))?;

    let request = SaveKeyRingRequest::for_ring(&ring)
        .revoke_user_id("b")
        .primary_user_id("b");
    let result = engine_at(t0 + 10).modify_secret_key_ring(&ring, &request, &Passphrase::empty());
    assert!(result.ring.is_none());
    assert!(result.log.contains(LogType::UserIdRevoked));
    assert_eq!(
        result.log.errors(),
        vec![LogType::PrimaryUserIdRevokedOrMissing]
    );

    let request = SaveKeyRingRequest::for_ring(&ring).primary_user_id("nobody");
    let result = engine_at(t0 + 10).modify_secret_key_ring(&ring, &request, &Passphrase::empty());
    assert_eq!(
        result.log.errors(),
        vec![LogType::PrimaryUserIdRevokedOrMissing]
    );
    Ok(())
}

#[test]
fn test_add_user_id_and_make_it_primary() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let ring = create_ring(&engine_at(t0), &curve25519_request(&["a"]))?;

    let request = SaveKeyRingRequest::for_ring(&ring)
        .add_user_id("c")
        .primary_user_id("c");
    let result = engine_at(t0 + 5).modify_secret_key_ring(&ring, &request, &Passphrase::empty());
    assert!(result.log.contains(LogType::UserIdAdded));
    assert!(result.log.contains(LogType::PrimaryUserIdChanged));
    assert!(result.log.contains(LogType::ModifySuccess));
    let modified = canonical(&result.ring.ok_or_else(|| anyhow!("no ring"))?)?;

    assert_eq!(user_id_strings(&modified), vec!["a", "c"]);
    assert_eq!(modified.primary_user_id().user_id().to_string_lossy(), "c");
    assert_eq!(modified.key_flags(), ring.key_flags());
    Ok(())
}

#[test]
fn test_re_adding_primary_user_id_keeps_it_primary() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let ring = create_ring(&engine_at(t0), &curve25519_request(&["a", "b"]))?;
    let request = SaveKeyRingRequest::for_ring(&ring).primary_user_id("b");
    let ring = modify_ring(&engine_at(t0 + 10), &ring, &request, &Passphrase::empty())?;
    assert_eq!(ring.primary_user_id().user_id().to_string_lossy(), "b");

    let request = SaveKeyRingRequest::for_ring(&ring).add_user_id("b");
    let result = engine_at(t0 + 20).modify_secret_key_ring(&ring, &request, &Passphrase::empty());
    assert!(result.log.contains(LogType::UserIdAdded));
    let modified = canonical(&result.ring.ok_or_else(|| anyhow!("no ring"))?)?;

    assert_eq!(user_id_strings(&modified), vec!["a", "b"]);
    let primary = modified.primary_user_id();
    assert_eq!(primary.user_id().to_string_lossy(), "b");
    assert_eq!(primary.certification().creation_time(), t0 + 20);
    assert!(primary.certification().is_primary_user_id());
    Ok(())
}

#[test]
fn test_last_user_id_cannot_be_revoked() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let ring = create_ring(&engine_at(t0), &curve25519_request(&["a", "b"]))?;

    let request = SaveKeyRingRequest::for_ring(&ring)
        .revoke_user_id("a")
        .revoke_user_id("b");
    let result = engine_at(t0 + 10).modify_secret_key_ring(&ring, &request, &Passphrase::empty());
    assert!(result.ring.is_none());
    assert_eq!(result.log.count(LogType::UserIdRevoked), 1);
    assert_eq!(result.log.errors(), vec![LogType::LastUserIdRevoked]);
    assert!(!result.log.contains(LogType::ModifySuccess));

    // Revoking one of two is fine.
    let request = SaveKeyRingRequest::for_ring(&ring).revoke_user_id("a");
    let modified = modify_ring(&engine_at(t0 + 10), &ring, &request, &Passphrase::empty())?;
    assert_eq!(user_id_strings(&modified), vec!["b"]);
    Ok(())
}

#[test]
fn test_new_signatures_are_newer_than_existing_ones() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let ring = create_ring(&engine_at(t0), &curve25519_request(&["a"]))?;

    // A clock behind the ring still produces strictly newer signatures.
    let request = SaveKeyRingRequest::for_ring(&ring).add_user_id("b");
    let modified = modify_ring(&engine_at(t0 - 500), &ring, &request, &Passphrase::empty())?;
    assert_eq!(modified.newest_signature_time(), t0 + 1);

    let request = SaveKeyRingRequest::for_ring(&modified).revoke_user_id("b");
    let result = engine_at(t0 - 500).modify_secret_key_ring(&modified, &request, &Passphrase::empty());
    let raw = result.ring.ok_or_else(|| anyhow!("revocation failed"))?;
    let revocation_time = raw
        .packets()
        .iter()
        .filter_map(|p| p.signature())
        .filter(|s| s.kind() == SignatureKind::CertificationRevocation)
        .map(|s| s.creation_time())
        .max();
    assert_eq!(revocation_time, Some(t0 + 2));
    Ok(())
}

#[test]
fn test_change_passphrase_re_encrypts_every_secret() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let request = curve25519_request(&["a"]).passphrase(Passphrase::from("old"));
    let ring = create_ring(&engine_at(t0), &request)?;
    let secret = ring
        .master_secret_key()
        .ok_or_else(|| anyhow!("no master secret"))?;
    assert!(secret.is_encrypted());
    assert!(unlock_secret(secret, b"old").is_ok());

    let request = SaveKeyRingRequest::for_ring(&ring).passphrase(Passphrase::from("new"));
    let result = engine_at(t0).modify_secret_key_ring(&ring, &request, &Passphrase::from("old"));
    assert!(result.log.contains(LogType::PassphraseChanged));
    let changed = canonical(&result.ring.ok_or_else(|| anyhow!("no ring"))?)?;

    let mut secrets = vec![changed
        .master_secret_key()
        .ok_or_else(|| anyhow!("no master secret"))?];
    for subkey in changed.subkeys() {
        secrets.push(subkey.secret_key().ok_or_else(|| anyhow!("no subkey secret"))?);
    }
    assert_eq!(secrets.len(), 3);
    for secret in secrets {
        assert!(matches!(
            unlock_secret(secret, b"old"),
            Err(KeyringError::WrongPassphrase)
        ));
        assert!(unlock_secret(secret, b"new").is_ok());
    }
    Ok(())
}

#[test]
fn test_modify_preconditions() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let engine = engine_at(t0);
    let request = curve25519_request(&["a"]).passphrase(Passphrase::from("secret"));
    let ring = create_ring(&engine, &request)?;
    let other = create_ring(&engine, &curve25519_request(&["z"]))?;
    let pass = Passphrase::from("secret");

    let result = engine.modify_secret_key_ring(&ring, &SaveKeyRingRequest::for_ring(&other), &pass);
    assert_eq!(result.log.errors(), vec![LogType::MasterKeyIdMismatch]);

    let mut request = SaveKeyRingRequest::for_ring(&ring);
    request.fingerprint = None;
    let result = engine.modify_secret_key_ring(&ring, &request, &pass);
    assert_eq!(result.log.errors(), vec![LogType::FingerprintMismatch]);

    let result = engine.modify_secret_key_ring(
        &ring,
        &SaveKeyRingRequest::for_ring(&ring),
        &Passphrase::from("wrong"),
    );
    assert_eq!(result.log.errors(), vec![LogType::WrongPassphrase]);

    let public = ring.to_public()?;
    let result = engine.modify_secret_key_ring(&public, &SaveKeyRingRequest::for_ring(&public), &pass);
    assert_eq!(result.log.errors(), vec![LogType::NotSecretKeyRing]);

    let result = engine.modify_secret_key_ring(&ring, &SaveKeyRingRequest::for_ring(&ring), &pass);
    assert!(result.is_ok());
    assert!(result.log.contains(LogType::ModifySuccess));
    Ok(())
}

#[test]
fn test_subkey_changes_are_validated() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let engine = engine_at(t0 + 10);
    let ring = create_ring(&engine_at(t0), &curve25519_request(&["a"]))?;
    let empty = Passphrase::empty();
    let encrypt_id = subkey_with_flags(&ring, KeyFlags::encrypt())?;

    let request = SaveKeyRingRequest::for_ring(&ring)
        .change_subkey(SubkeyChange::new(ring.master_key_id()).with_flags(KeyFlags::sign()));
    let result = engine.modify_secret_key_ring(&ring, &request, &empty);
    assert_eq!(result.log.errors(), vec![LogType::MasterKeyNoCertifyFlag]);

    let request = SaveKeyRingRequest::for_ring(&ring)
        .change_subkey(SubkeyChange::new(encrypt_id).with_expiry(t0));
    let result = engine.modify_secret_key_ring(&ring, &request, &empty);
    assert_eq!(result.log.errors(), vec![LogType::ExpiryInPast]);

    let request = SaveKeyRingRequest::for_ring(&ring)
        .change_subkey(SubkeyChange::new(pgp_keyring::KeyId(0x1234)))
        .revoke_subkey(pgp_keyring::KeyId(0x5678));
    let result = engine.modify_secret_key_ring(&ring, &request, &empty);
    assert_eq!(
        result.log.errors(),
        vec![LogType::SubkeyNotFound, LogType::SubkeyNotFound]
    );
    assert!(result.ring.is_none());
    Ok(())
}

#[test]
fn test_change_subkey_flags_and_expiry() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let ring = create_ring(&engine_at(t0), &curve25519_request(&["a"]))?;
    let sign_id = subkey_with_flags(&ring, KeyFlags::sign())?;
    let expiry = current_unix_timestamp() + 86_400;

    let request = SaveKeyRingRequest::for_ring(&ring).change_subkey(
        SubkeyChange::new(sign_id)
            .with_flags(KeyFlags::sign().with(KeyFlags::authenticate()))
            .with_expiry(expiry),
    );
    let changed = modify_ring(&engine_at(t0 + 10), &ring, &request, &Passphrase::empty())?;
    let info = changed
        .subkey(sign_id)
        .ok_or_else(|| anyhow!("signing subkey dropped"))?;
    assert!(info.key_flags().can_sign());
    assert!(info.key_flags().can_authenticate());
    assert_eq!(info.expiry(), Some(expiry));
    assert!(!info.binding().embedded_signatures().is_empty());

    // Some(0) clears the expiry again.
    let request = SaveKeyRingRequest::for_ring(&changed)
        .change_subkey(SubkeyChange::new(sign_id).with_expiry(0));
    let cleared = modify_ring(&engine_at(t0 + 20), &changed, &request, &Passphrase::empty())?;
    let info = cleared
        .subkey(sign_id)
        .ok_or_else(|| anyhow!("signing subkey dropped"))?;
    assert_eq!(info.expiry(), None);
    assert!(info.key_flags().can_authenticate());

    // Master flags and expiry change through a re-certification.
    let request = SaveKeyRingRequest::for_ring(&cleared).change_subkey(
        SubkeyChange::new(cleared.master_key_id())
            .with_flags(KeyFlags::certify().with(KeyFlags::sign()))
            .with_expiry(expiry),
    );
    let result = engine_at(t0 + 30).modify_secret_key_ring(&cleared, &request, &Passphrase::empty());
    assert!(result.log.contains(LogType::UserIdRecertified));
    let master_changed = canonical(&result.ring.ok_or_else(|| anyhow!("no ring"))?)?;
    assert!(master_changed.key_flags().can_sign());
    assert_eq!(master_changed.expiry(), Some(expiry));
    Ok(())
}

#[test]
fn test_add_and_revoke_subkeys() -> Result<()> {
    init_logging();
    let t0 = seconds_ago(10_000);
    let ring = create_ring(&engine_at(t0), &curve25519_request(&["a"]))?;
    let pass = Passphrase::empty();

    let request = SaveKeyRingRequest::for_ring(&ring)
        .add_subkey(SubkeyAdd::new(PublicKeyAlgorithm::Ecdsa, KeyFlags::authenticate()))
        .add_subkey(
            SubkeyAdd::new(PublicKeyAlgorithm::Ecdh, KeyFlags::encrypt()).with_curve(Curve::NistP256),
        );
    let result = engine_at(t0 + 10).modify_secret_key_ring(&ring, &request, &pass);
    assert_eq!(result.log.count(LogType::SubkeyAdded), 2);
    let grown = canonical(&result.ring.ok_or_else(|| anyhow!("no ring"))?)?;
    assert_eq!(grown.subkeys().len(), 4);
    let auth_id = subkey_with_flags(&grown, KeyFlags::authenticate())?;
    let auth = grown
        .subkey(auth_id)
        .ok_or_else(|| anyhow!("new subkey dropped"))?;
    assert_eq!(auth.algorithm(), PublicKeyAlgorithm::Ecdsa);
    assert!(auth.has_secret());

    let request = SaveKeyRingRequest::for_ring(&grown).revoke_subkey(auth_id);
    let shrunk = modify_ring(&engine_at(t0 + 20), &grown, &request, &pass)?;
    assert!(shrunk
        .subkey(auth_id)
        .map(|s| s.is_revoked())
        .unwrap_or(false));

    let request = SaveKeyRingRequest::for_ring(&shrunk).revoke_subkey(shrunk.master_key_id());
    let result = engine_at(t0 + 30).modify_secret_key_ring(&shrunk, &request, &pass);
    assert!(result.log.contains(LogType::MasterKeyRevoked));
    let revoked = canonical(&result.ring.ok_or_else(|| anyhow!("no ring"))?)?;
    assert!(revoked.is_revoked());
    Ok(())
}

#[test]
fn test_faster_protection_from_config() -> Result<()> {
    init_logging();
    let config = KeyringConfig::new().with_s2k_count(0x10);
    let logger = Arc::new(pgp_common::logging::Logger::new_root(
        pgp_common::logging::Component::KeyOperation,
        "fast",
    ));
    let engine = KeyOperationEngine::new(config, logger).with_time(seconds_ago(10_000));
    assert_eq!(engine.config().s2k_count, 0x10);

    let request = curve25519_request(&["a"]).passphrase(Passphrase::from("pw"));
    let ring = create_ring(&engine, &request)?;
    let secret = ring
        .master_secret_key()
        .ok_or_else(|| anyhow!("no master secret"))?;
    assert!(secret.is_encrypted());
    assert!(unlock_secret(secret, b"pw").is_ok());
    Ok(())
}
