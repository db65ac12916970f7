//! Raw signing and verification of precomputed digests.

use super::secret::{padded_secret, SecretParams, UnlockedKey};
use crate::error::{KeyringError, Result};
use crate::packet::{Mpi, PublicKeyMaterial, PublicParams};
use crate::types::{Curve, HashAlgorithm};
use num_bigint_dig::BigUint;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

/// Largest RSA modulus accepted for verification.
const RSA_MAX_BITS: usize = 16384;

fn pkcs1_padding(hash: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    Ok(match hash {
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        HashAlgorithm::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        other => {
            return Err(KeyringError::UnsupportedAlgorithm(format!(
                "hash algorithm {} for RSA",
                other.id()
            )))
        }
    })
}

fn unsupported<T>(public: &PublicKeyMaterial) -> Result<T> {
    Err(KeyringError::UnsupportedAlgorithm(format!(
        "{} signatures",
        public.algorithm()
    )))
}

fn big(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Sign `digest` with the secret key, returning the signature MPIs.
pub fn sign_digest(signer: &UnlockedKey, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<Mpi>> {
    let public = signer.public();
    if !public.algorithm().can_sign() {
        return unsupported(public);
    }

    match (public.params(), signer.secret()) {
        (PublicParams::Rsa { n, e }, SecretParams::Rsa { d, p, q, .. }) => {
            let key = RsaPrivateKey::from_components(
                big(n.as_bytes()),
                big(e.as_bytes()),
                big(d),
                vec![big(p), big(q)],
            )?;
            let sig = key.sign(pkcs1_padding(hash)?, digest)?;
            Ok(vec![Mpi::new(&sig)])
        }
        (PublicParams::Dsa { p, q, g, y }, SecretParams::Dsa { x }) => {
            use dsa::signature::hazmat::PrehashSigner;
            let components =
                dsa::Components::from_components(big(p.as_bytes()), big(q.as_bytes()), big(g.as_bytes()))?;
            let verifying = dsa::VerifyingKey::from_components(components, big(y.as_bytes()))?;
            let signing = dsa::SigningKey::from_components(verifying, big(x))?;
            let sig: dsa::Signature = signing.sign_prehash(digest)?;
            Ok(vec![
                Mpi::new(&sig.r().to_bytes_be()),
                Mpi::new(&sig.s().to_bytes_be()),
            ])
        }
        (PublicParams::Ecdsa { .. }, SecretParams::Ecc { scalar })
            if public.curve() == Some(Curve::NistP256) =>
        {
            use p256::ecdsa::signature::hazmat::PrehashSigner;
            let signing = p256::ecdsa::SigningKey::from_slice(&padded_secret(scalar, 32))?;
            let sig: p256::ecdsa::Signature = signing.sign_prehash(digest)?;
            let (r, s) = sig.split_bytes();
            Ok(vec![Mpi::new(&r), Mpi::new(&s)])
        }
        (PublicParams::EdDsa { .. }, SecretParams::Ecc { scalar })
            if public.curve() == Some(Curve::Ed25519) =>
        {
            use ed25519_dalek::Signer;
            let seed: [u8; 32] = padded_secret(scalar, 32)
                .as_slice()
                .try_into()
                .map_err(|_| KeyringError::InvalidKey("Ed25519 seed too long".to_string()))?;
            let signing = ed25519_dalek::SigningKey::from_bytes(&seed);
            let sig = signing.sign(digest);
            Ok(vec![Mpi::new(sig.r_bytes()), Mpi::new(sig.s_bytes())])
        }
        _ => unsupported(public),
    }
}

/// Verify signature MPIs over `digest`.
///
/// Returns `Ok(false)` for a well-formed but invalid signature and an error
/// when the algorithm, curve or hash is not supported.
pub fn verify_digest(
    public: &PublicKeyMaterial,
    hash: HashAlgorithm,
    digest: &[u8],
    mpis: &[Mpi],
) -> Result<bool> {
    match (public.params(), mpis) {
        (PublicParams::Rsa { n, e }, [s]) => {
            let key = match RsaPublicKey::new_with_max_size(
                big(n.as_bytes()),
                big(e.as_bytes()),
                RSA_MAX_BITS,
            ) {
                Ok(key) => key,
                Err(_) => return Ok(false),
            };
            let padding = pkcs1_padding(hash)?;
            // rsa requires the signature to be exactly as long as the modulus.
            let sig = s.to_padded(key.size());
            Ok(key.verify(padding, digest, &sig).is_ok())
        }
        (PublicParams::Dsa { p, q, g, y }, [r, s]) => {
            use dsa::signature::hazmat::PrehashVerifier;
            let verifying = dsa::Components::from_components(
                big(p.as_bytes()),
                big(q.as_bytes()),
                big(g.as_bytes()),
            )
            .and_then(|c| dsa::VerifyingKey::from_components(c, big(y.as_bytes())));
            let sig = dsa::Signature::from_components(big(r.as_bytes()), big(s.as_bytes()));
            match (verifying, sig) {
                (Ok(key), Ok(sig)) => Ok(key.verify_prehash(digest, &sig).is_ok()),
                _ => Ok(false),
            }
        }
        (PublicParams::Ecdsa { q, .. }, [r, s]) if public.curve() == Some(Curve::NistP256) => {
            use p256::ecdsa::signature::hazmat::PrehashVerifier;
            let (r, s) = (r.to_padded(32), s.to_padded(32));
            if r.len() != 32 || s.len() != 32 {
                return Ok(false);
            }
            let key = match p256::ecdsa::VerifyingKey::from_sec1_bytes(q.as_bytes()) {
                Ok(key) => key,
                Err(_) => return Ok(false),
            };
            let sig = match p256::ecdsa::Signature::from_scalars(
                p256::FieldBytes::clone_from_slice(&r),
                p256::FieldBytes::clone_from_slice(&s),
            ) {
                Ok(sig) => sig,
                Err(_) => return Ok(false),
            };
            Ok(key.verify_prehash(digest, &sig).is_ok())
        }
        (PublicParams::EdDsa { q, .. }, [r, s]) if public.curve() == Some(Curve::Ed25519) => {
            use ed25519_dalek::Verifier;
            let point: [u8; 32] = match q.as_bytes() {
                [0x40, rest @ ..] if rest.len() == 32 => {
                    let mut point = [0u8; 32];
                    point.copy_from_slice(rest);
                    point
                }
                _ => return Ok(false),
            };
            let (r, s) = (r.to_padded(32), s.to_padded(32));
            if r.len() != 32 || s.len() != 32 {
                return Ok(false);
            }
            let key = match ed25519_dalek::VerifyingKey::from_bytes(&point) {
                Ok(key) => key,
                Err(_) => return Ok(false),
            };
            let mut bytes = [0u8; 64];
            bytes[..32].copy_from_slice(&r);
            bytes[32..].copy_from_slice(&s);
            let sig = ed25519_dalek::Signature::from_bytes(&bytes);
            Ok(key.verify(digest, &sig).is_ok())
        }
        // Supported key, wrong number of signature values
        (PublicParams::Rsa { .. } | PublicParams::Dsa { .. }, _) => Ok(false),
        (PublicParams::Ecdsa { .. }, _) if public.curve() == Some(Curve::NistP256) => Ok(false),
        (PublicParams::EdDsa { .. }, _) if public.curve() == Some(Curve::Ed25519) => Ok(false),
        _ => unsupported(public),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_key;
    use crate::types::PublicKeyAlgorithm;
    use sha2::{Digest, Sha256};

    fn check_algorithm(algorithm: PublicKeyAlgorithm, bits: Option<u32>) {
        let key = generate_key(algorithm, bits, None, 1_600_000_000).unwrap();
        let digest = Sha256::digest(b"message").to_vec();
        let mpis = sign_digest(&key, HashAlgorithm::Sha256, &digest).unwrap();
        assert!(verify_digest(key.public(), HashAlgorithm::Sha256, &digest, &mpis).unwrap());

        let other = Sha256::digest(b"other").to_vec();
        assert!(!verify_digest(key.public(), HashAlgorithm::Sha256, &other, &mpis).unwrap());
    }

    #[test]
    fn test_ed25519_sign_verify() {
        check_algorithm(PublicKeyAlgorithm::EdDsa, None);
    }

    #[test]
    fn test_p256_sign_verify() {
        check_algorithm(PublicKeyAlgorithm::Ecdsa, None);
    }

    #[test]
    fn test_rsa_sign_verify() {
        check_algorithm(PublicKeyAlgorithm::RsaEncryptSign, Some(1024));
    }

    #[test]
    fn test_encryption_key_cannot_sign() {
        let key = generate_key(PublicKeyAlgorithm::Ecdh, None, None, 0).unwrap();
        assert!(matches!(
            sign_digest(&key, HashAlgorithm::Sha256, &[0u8; 32]),
            Err(KeyringError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_wrong_mpi_count_is_invalid() {
        let key = generate_key(PublicKeyAlgorithm::EdDsa, None, None, 0).unwrap();
        let mpis = vec![Mpi::new(&[1])];
        assert!(!verify_digest(key.public(), HashAlgorithm::Sha256, &[0u8; 32], &mpis).unwrap());
    }
}
