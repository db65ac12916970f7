//! Signature target hashing and verification.
//!
//! A v4 signature digest covers the signed target (key, key + user id, or
//! master + subkey), then the signature's hashed prefix, then the trailer
//! `0x04 0xFF len32`.

use crate::crypto::{verify_digest, HashContext};
use crate::error::Result;
use crate::packet::{PublicKeyMaterial, Signature, UserAttribute, UserId};
use crate::types::HashAlgorithm;

/// What a signature is made over.
#[derive(Debug, Clone, Copy)]
pub enum SignatureTarget<'a> {
    /// Direct-key signatures and key revocations
    Key(&'a PublicKeyMaterial),
    UserId(&'a PublicKeyMaterial, &'a UserId),
    UserAttribute(&'a PublicKeyMaterial, &'a UserAttribute),
    /// Subkey bindings, subkey revocations and primary key bindings
    Subkey {
        master: &'a PublicKeyMaterial,
        subkey: &'a PublicKeyMaterial,
    },
}

fn hash_key(ctx: &mut HashContext, key: &PublicKeyMaterial) {
    let body = key.body();
    ctx.update(&[0x99]);
    ctx.update(&(body.len() as u16).to_be_bytes());
    ctx.update(body);
}

impl SignatureTarget<'_> {
    fn hash_into(&self, ctx: &mut HashContext) {
        match self {
            SignatureTarget::Key(key) => hash_key(ctx, key),
            SignatureTarget::UserId(key, uid) => {
                hash_key(ctx, key);
                ctx.update(&[0xB4]);
                ctx.update(&(uid.value().len() as u32).to_be_bytes());
                ctx.update(uid.value());
            }
            SignatureTarget::UserAttribute(key, attr) => {
                hash_key(ctx, key);
                ctx.update(&[0xD1]);
                ctx.update(&(attr.data().len() as u32).to_be_bytes());
                ctx.update(attr.data());
            }
            SignatureTarget::Subkey { master, subkey } => {
                hash_key(ctx, master);
                hash_key(ctx, subkey);
            }
        }
    }
}

/// Digest of `target` plus a signature's hashed prefix and trailer.
pub fn signature_digest(
    hashed_prefix: &[u8],
    hash: HashAlgorithm,
    target: &SignatureTarget<'_>,
) -> Result<Vec<u8>> {
    let mut ctx = HashContext::new(hash)?;
    target.hash_into(&mut ctx);
    ctx.update(hashed_prefix);
    ctx.update(&[0x04, 0xFF]);
    ctx.update(&(hashed_prefix.len() as u32).to_be_bytes());
    Ok(ctx.finalize())
}

impl Signature {
    /// Check this signature over `target` with the issuer key `signer`.
    ///
    /// `Ok(false)` means the signature is invalid; errors report
    /// unsupported hash or public key algorithms.
    pub fn verify(&self, signer: &PublicKeyMaterial, target: &SignatureTarget<'_>) -> Result<bool> {
        if self.algorithm() != signer.algorithm() {
            return Ok(false);
        }
        let digest = signature_digest(self.hashed_prefix(), self.hash_algorithm(), target)?;
        if digest[..2] != self.digest_prefix() {
            return Ok(false);
        }
        verify_digest(signer, self.hash_algorithm(), &digest, self.mpis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_key;
    use crate::packet::{CertificationLevel, SignatureBuilder, SignatureKind};
    use crate::types::PublicKeyAlgorithm;

    #[test]
    fn test_certification_verifies_only_for_its_user_id() {
        let key = generate_key(PublicKeyAlgorithm::EdDsa, None, None, 1_600_000_000).unwrap();
        let alice = UserId::from("Alice <alice@example.org>");
        let bob = UserId::from("Bob <bob@example.org>");

        let sig = SignatureBuilder::new(
            SignatureKind::Certification(CertificationLevel::Positive),
            1_600_000_100,
        )
        .sign(&key, &SignatureTarget::UserId(key.public(), &alice))
        .unwrap();

        assert_eq!(sig.issuer(), Some(key.public().key_id()));
        assert_eq!(sig.issuer_fingerprint(), Some(key.public().fingerprint()));
        assert!(sig
            .verify(key.public(), &SignatureTarget::UserId(key.public(), &alice))
            .unwrap());
        assert!(!sig
            .verify(key.public(), &SignatureTarget::UserId(key.public(), &bob))
            .unwrap());
    }

    #[test]
    fn test_wrong_signer_fails() {
        let master = generate_key(PublicKeyAlgorithm::EdDsa, None, None, 1_600_000_000).unwrap();
        let other = generate_key(PublicKeyAlgorithm::EdDsa, None, None, 1_600_000_000).unwrap();
        let sig = SignatureBuilder::new(SignatureKind::DirectKey, 1_600_000_100)
            .sign(&master, &SignatureTarget::Key(master.public()))
            .unwrap();
        assert!(!sig
            .verify(other.public(), &SignatureTarget::Key(master.public()))
            .unwrap());
    }

    #[test]
    fn test_subkey_target_order_matters() {
        let master = generate_key(PublicKeyAlgorithm::Ecdsa, None, None, 1_600_000_000).unwrap();
        let sub = generate_key(PublicKeyAlgorithm::Ecdh, None, None, 1_600_000_000).unwrap();
        let sig = SignatureBuilder::new(SignatureKind::SubkeyBinding, 1_600_000_100)
            .sign(
                &master,
                &SignatureTarget::Subkey {
                    master: master.public(),
                    subkey: sub.public(),
                },
            )
            .unwrap();
        assert!(sig
            .verify(
                master.public(),
                &SignatureTarget::Subkey {
                    master: master.public(),
                    subkey: sub.public()
                }
            )
            .unwrap());
        assert!(!sig
            .verify(
                master.public(),
                &SignatureTarget::Subkey {
                    master: sub.public(),
                    subkey: master.public()
                }
            )
            .unwrap());
    }
}
