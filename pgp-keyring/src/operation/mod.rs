//! Key operation engine: creation and modification of secret keyrings.
//!
//! Every action appends freshly signed packets; existing signatures are never
//! edited. The resulting [`RawKeyRing`] is meant to be canonicalized by the
//! caller before use.

mod create;
mod modify;
mod request;

pub use request::{OperationResult, Passphrase, SaveKeyRingRequest, SubkeyAdd, SubkeyChange};

use crate::config::KeyringConfig;
use crate::crypto::{generate_key, UnlockedKey};
use crate::error::{KeyringError, Result};
use crate::oplog::{LogType, OperationLog};
use crate::packet::{
    CertificationLevel, Packet, PacketBody, PublicKeyMaterial, Signature, SignatureBuilder,
    SignatureKind, UserId,
};
use crate::types::{current_unix_timestamp, Curve, KeyFlags, PublicKeyAlgorithm};
use crate::verify::SignatureTarget;
use pgp_common::logging::{Component, Logger};
use std::sync::Arc;

/// Reason for revocation codes (RFC 4880 section 5.2.3.23).
const REVOCATION_NO_REASON: u8 = 0x00;
const REVOCATION_USER_ID_INVALID: u8 = 0x20;

/// Creates and edits secret keyrings according to [`SaveKeyRingRequest`]s.
#[derive(Debug, Clone)]
pub struct KeyOperationEngine {
    config: KeyringConfig,
    logger: Arc<Logger>,
    fixed_time: Option<u32>,
}

impl KeyOperationEngine {
    pub fn new(config: KeyringConfig, logger: Arc<Logger>) -> Self {
        Self {
            config,
            logger,
            fixed_time: None,
        }
    }

    /// Engine with default configuration and a root logger.
    pub fn with_defaults() -> Self {
        Self::new(
            KeyringConfig::default(),
            Arc::new(Logger::new_root(Component::KeyOperation, "engine")),
        )
    }

    /// Use `now` instead of the system clock as the current time.
    pub fn with_time(mut self, now: u32) -> Self {
        self.fixed_time = Some(now);
        self
    }

    pub fn config(&self) -> &KeyringConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> u32 {
        self.fixed_time.unwrap_or_else(current_unix_timestamp)
    }

    pub(crate) fn new_log(&self) -> OperationLog {
        OperationLog::with_logger(self.logger.clone())
    }

    /// Check a subkey request, logging every problem. Returns false if any
    /// was found.
    pub(crate) fn validate_subkey(
        &self,
        add: &SubkeyAdd,
        now: u32,
        log: &mut OperationLog,
    ) -> bool {
        let subject = add.algorithm.to_string();
        let mut ok = true;

        if let PublicKeyAlgorithm::Unknown(_) = add.algorithm {
            log.add_with(LogType::UnknownAlgorithm, subject);
            return false;
        }
        if matches!(
            add.algorithm,
            PublicKeyAlgorithm::ElGamalEncrypt | PublicKeyAlgorithm::ElGamalEncryptSign
        ) || resolve_curve(add.algorithm, add.curve).is_err()
        {
            log.add_with(LogType::AlgorithmUnsupported, &subject);
            ok = false;
        }
        if (add.flags.needs_signing_algorithm() && !add.algorithm.can_sign())
            || (add.flags.can_encrypt() && !add.algorithm.can_encrypt())
        {
            log.add_with(LogType::AlgorithmUnsupported, &subject);
            ok = false;
        }
        if let Some(bits) = add.key_size {
            if !add.algorithm.is_curve_based() && bits < self.config.min_key_bits {
                log.add_with(LogType::KeyTooSmall, format!("{subject} {bits}"));
                ok = false;
            }
        }
        if add.expiry != 0 && add.expiry <= now {
            log.add_with(LogType::ExpiryInPast, &subject);
            ok = false;
        }
        ok
    }

    /// Generate key material for a validated subkey request.
    pub(crate) fn generate(&self, add: &SubkeyAdd, creation_time: u32) -> Result<UnlockedKey> {
        let curve = resolve_curve(add.algorithm, add.curve)?;
        generate_key(add.algorithm, add.key_size, curve, creation_time)
    }

    fn builder(&self, kind: SignatureKind, time: u32) -> SignatureBuilder {
        SignatureBuilder::new(kind, time).hash_algorithm(self.config.hash_algorithm)
    }

    /// Positive self-certification of `user_id`.
    pub(crate) fn certify_user_id(
        &self,
        master: &UnlockedKey,
        user_id: &UserId,
        flags: KeyFlags,
        key_expiration: Option<u32>,
        primary: bool,
        time: u32,
    ) -> Result<Signature> {
        self.builder(
            SignatureKind::Certification(CertificationLevel::Positive),
            time,
        )
        .key_flags(flags)
        .key_expiration(key_expiration)
        .primary_user_id(primary)
        .preferences()
        .sign(master, &SignatureTarget::UserId(master.public(), user_id))
    }

    pub(crate) fn revoke_user_id(
        &self,
        master: &UnlockedKey,
        user_id: &UserId,
        time: u32,
    ) -> Result<Signature> {
        self.builder(SignatureKind::CertificationRevocation, time)
            .reason_for_revocation(REVOCATION_USER_ID_INVALID, "")
            .sign(master, &SignatureTarget::UserId(master.public(), user_id))
    }

    /// Subkey binding; signing subkeys get an embedded primary key binding
    /// made with `subkey`, which must then be unlocked.
    pub(crate) fn bind_subkey(
        &self,
        master: &UnlockedKey,
        subkey: &PublicKeyMaterial,
        subkey_secret: Option<&UnlockedKey>,
        flags: KeyFlags,
        key_expiration: Option<u32>,
        time: u32,
    ) -> Result<Signature> {
        let target = SignatureTarget::Subkey {
            master: master.public(),
            subkey,
        };
        let mut builder = self
            .builder(SignatureKind::SubkeyBinding, time)
            .key_flags(flags)
            .key_expiration(key_expiration);
        if flags.can_sign() {
            let signer = subkey_secret.ok_or_else(|| {
                KeyringError::SecretKeyUnavailable(format!(
                    "{} is needed for the primary key binding",
                    subkey.key_id()
                ))
            })?;
            let back = self
                .builder(SignatureKind::PrimaryKeyBinding, time)
                .sign(signer, &target)?;
            builder = builder.embedded_signature(back);
        }
        builder.sign(master, &target)
    }

    pub(crate) fn revoke_key(
        &self,
        master: &UnlockedKey,
        subkey: Option<&PublicKeyMaterial>,
        time: u32,
    ) -> Result<Signature> {
        match subkey {
            None => self
                .builder(SignatureKind::KeyRevocation, time)
                .reason_for_revocation(REVOCATION_NO_REASON, "")
                .sign(master, &SignatureTarget::Key(master.public())),
            Some(subkey) => self
                .builder(SignatureKind::SubkeyRevocation, time)
                .reason_for_revocation(REVOCATION_NO_REASON, "")
                .sign(
                    master,
                    &SignatureTarget::Subkey {
                        master: master.public(),
                        subkey,
                    },
                ),
        }
    }

    /// Secret key packet for `key`, protected under `passphrase`.
    pub(crate) fn secret_packet(
        &self,
        key: &UnlockedKey,
        passphrase: &Passphrase,
        is_master: bool,
    ) -> Result<Packet> {
        let material = key.protect(passphrase.as_bytes(), &self.config)?;
        Ok(Packet::new(if is_master {
            PacketBody::SecretKey(material)
        } else {
            PacketBody::SecretSubkey(material)
        }))
    }
}

/// Curve to generate for `algorithm`: the requested one if it fits, the
/// default otherwise. Non-curve algorithms ignore the curve.
fn resolve_curve(algorithm: PublicKeyAlgorithm, curve: Option<Curve>) -> Result<Option<Curve>> {
    let resolved = match (algorithm, curve) {
        (PublicKeyAlgorithm::Ecdsa, None | Some(Curve::NistP256)) => Curve::NistP256,
        (PublicKeyAlgorithm::EdDsa, None | Some(Curve::Ed25519)) => Curve::Ed25519,
        (PublicKeyAlgorithm::Ecdh, None | Some(Curve::Cv25519)) => Curve::Cv25519,
        (PublicKeyAlgorithm::Ecdh, Some(Curve::NistP256)) => Curve::NistP256,
        (_, Some(c)) if algorithm.is_curve_based() => {
            return Err(KeyringError::UnsupportedAlgorithm(format!(
                "curve {c:?} for {algorithm}"
            )))
        }
        _ => return Ok(None),
    };
    Ok(Some(resolved))
}

/// Key expiration subpacket value for an absolute expiry time.
pub(crate) fn key_expiration(expiry: u32, creation_time: u32) -> Option<u32> {
    if expiry == 0 {
        None
    } else {
        Some(expiry.saturating_sub(creation_time).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_curve_defaults_and_rejects() {
        assert_eq!(
            resolve_curve(PublicKeyAlgorithm::EdDsa, None).unwrap(),
            Some(Curve::Ed25519)
        );
        assert_eq!(
            resolve_curve(PublicKeyAlgorithm::Ecdh, Some(Curve::NistP256)).unwrap(),
            Some(Curve::NistP256)
        );
        assert!(resolve_curve(PublicKeyAlgorithm::Ecdsa, Some(Curve::Ed25519)).is_err());
        assert_eq!(
            resolve_curve(PublicKeyAlgorithm::RsaEncryptSign, Some(Curve::Ed25519)).unwrap(),
            None
        );
    }

    #[test]
    fn test_validate_subkey_reports_each_problem() {
        let engine = KeyOperationEngine::with_defaults();
        let mut log = OperationLog::new();
        let add = SubkeyAdd::new(PublicKeyAlgorithm::RsaEncryptSign, KeyFlags::sign())
            .with_key_size(256)
            .with_expiry(100);
        assert!(!engine.validate_subkey(&add, 1_000, &mut log));
        assert!(log.contains(LogType::KeyTooSmall));
        assert!(log.contains(LogType::ExpiryInPast));

        let mut log = OperationLog::new();
        let add = SubkeyAdd::new(PublicKeyAlgorithm::Ecdh, KeyFlags::sign());
        assert!(!engine.validate_subkey(&add, 1_000, &mut log));
        assert_eq!(log.errors(), vec![LogType::AlgorithmUnsupported]);

        let mut log = OperationLog::new();
        let add = SubkeyAdd::new(PublicKeyAlgorithm::Unknown(99), KeyFlags::sign());
        assert!(!engine.validate_subkey(&add, 1_000, &mut log));
        assert_eq!(log.errors(), vec![LogType::UnknownAlgorithm]);
    }

    #[test]
    fn test_key_expiration_is_relative() {
        assert_eq!(key_expiration(0, 500), None);
        assert_eq!(key_expiration(1_500, 500), Some(1_000));
    }
}
