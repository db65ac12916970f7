//! Secret key parameters: generation, passphrase protection and unlocking.

use super::{cfb_decrypt, cfb_encrypt, derive_key};
use crate::config::KeyringConfig;
use crate::error::{KeyringError, Result};
use crate::packet::key::{curve_params, secret_checksum};
use crate::packet::mpi::{read_secret_mpi, write_mpi};
use crate::packet::{
    ByteReader, Mpi, PublicKeyMaterial, PublicParams, S2k, SecretKeyMaterial, SecretProtection,
};
use crate::types::{Curve, PublicKeyAlgorithm};
use num_bigint_dig::{traits::ModInverse, BigUint};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

/// Algorithm-specific secret parameters, big-endian, zeroized on drop.
#[derive(Clone)]
pub enum SecretParams {
    Rsa {
        d: Zeroizing<Vec<u8>>,
        p: Zeroizing<Vec<u8>>,
        q: Zeroizing<Vec<u8>>,
        u: Zeroizing<Vec<u8>>,
    },
    Dsa {
        x: Zeroizing<Vec<u8>>,
    },
    ElGamal {
        x: Zeroizing<Vec<u8>>,
    },
    /// Scalar of an ECDSA or ECDH key, or the seed of an EdDSA key
    Ecc {
        scalar: Zeroizing<Vec<u8>>,
    },
}

impl std::fmt::Debug for SecretParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SecretParams::Rsa { .. } => "Rsa",
            SecretParams::Dsa { .. } => "Dsa",
            SecretParams::ElGamal { .. } => "ElGamal",
            SecretParams::Ecc { .. } => "Ecc",
        };
        write!(f, "SecretParams::{name}(<redacted>)")
    }
}

impl SecretParams {
    fn parse(algorithm: PublicKeyAlgorithm, data: &[u8]) -> Result<Self> {
        use PublicKeyAlgorithm::*;
        let mut r = ByteReader::new(data, 0);
        let params = match algorithm {
            RsaEncryptSign | RsaEncrypt | RsaSign => SecretParams::Rsa {
                d: read_secret_mpi(&mut r)?,
                p: read_secret_mpi(&mut r)?,
                q: read_secret_mpi(&mut r)?,
                u: read_secret_mpi(&mut r)?,
            },
            Dsa => SecretParams::Dsa {
                x: read_secret_mpi(&mut r)?,
            },
            ElGamalEncrypt | ElGamalEncryptSign => SecretParams::ElGamal {
                x: read_secret_mpi(&mut r)?,
            },
            Ecdh | Ecdsa | EdDsa => SecretParams::Ecc {
                scalar: read_secret_mpi(&mut r)?,
            },
            Unknown(id) => {
                return Err(KeyringError::UnsupportedAlgorithm(format!(
                    "secret parameters of algorithm {id}"
                )))
            }
        };
        if !r.is_empty() {
            return Err(r.error("trailing data after secret parameters"));
        }
        Ok(params)
    }

    /// MPI encoding of the parameters, without checksum.
    fn to_mpis(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::new());
        match self {
            SecretParams::Rsa { d, p, q, u } => {
                for value in [d, p, q, u] {
                    write_mpi(&mut out, value);
                }
            }
            SecretParams::Dsa { x } | SecretParams::ElGamal { x } => write_mpi(&mut out, x),
            SecretParams::Ecc { scalar } => write_mpi(&mut out, scalar),
        }
        out
    }
}

/// Big-endian secret value left-padded with zeros to `len` bytes.
pub(crate) fn padded_secret(bytes: &[u8], len: usize) -> Zeroizing<Vec<u8>> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let value = &bytes[start..];
    let mut out = Zeroizing::new(vec![0u8; len.saturating_sub(value.len())]);
    out.extend_from_slice(value);
    out
}

/// A key whose secret parameters are available in memory.
#[derive(Clone, Debug)]
pub struct UnlockedKey {
    public: PublicKeyMaterial,
    secret: SecretParams,
}

impl UnlockedKey {
    pub fn new(public: PublicKeyMaterial, secret: SecretParams) -> Result<Self> {
        check_consistency(&public, &secret)?;
        Ok(Self { public, secret })
    }

    pub fn public(&self) -> &PublicKeyMaterial {
        &self.public
    }

    pub fn secret(&self) -> &SecretParams {
        &self.secret
    }

    /// Secret key packet body protected under `passphrase`.
    pub fn protect(&self, passphrase: &[u8], config: &KeyringConfig) -> Result<SecretKeyMaterial> {
        protect_secret(&self.public, &self.secret, passphrase, config)
    }
}

/// Recover the secret parameters of `material` with `passphrase`.
///
/// Unencrypted keys unlock with any passphrase.
pub fn unlock_secret(material: &SecretKeyMaterial, passphrase: &[u8]) -> Result<UnlockedKey> {
    let public = material.public().clone();
    let key_id = public.key_id();
    let (plain, encrypted) = match material.protection() {
        SecretProtection::Unprotected { data, checksum } => {
            if secret_checksum(data) != *checksum {
                return Err(KeyringError::InvalidKey(format!(
                    "secret key checksum mismatch for {key_id}"
                )));
            }
            (data.clone(), false)
        }
        SecretProtection::Encrypted {
            usage,
            cipher,
            s2k,
            iv,
            data,
        } => {
            let key_len = cipher.key_size().ok_or_else(|| {
                KeyringError::UnsupportedAlgorithm(format!("cipher {}", cipher.id()))
            })?;
            let key = derive_key(s2k, passphrase, key_len)?;
            let mut plain = Zeroizing::new(data.clone());
            cfb_decrypt(*cipher, &key, iv, &mut plain)?;
            (strip_check(&plain, *usage == 254)?, true)
        }
        SecretProtection::GnuDummy => {
            return Err(KeyringError::SecretKeyUnavailable(format!(
                "{key_id} is a stub"
            )))
        }
        SecretProtection::DivertToCard { .. } => {
            return Err(KeyringError::SecretKeyUnavailable(format!(
                "{key_id} is stored on a smartcard"
            )))
        }
    };

    let secret = match SecretParams::parse(public.algorithm(), &plain) {
        Ok(secret) => secret,
        // A 2-byte checksum can pass by chance with the wrong passphrase.
        Err(KeyringError::MalformedPacket { .. }) if encrypted => {
            return Err(KeyringError::WrongPassphrase)
        }
        Err(err) => return Err(err),
    };
    UnlockedKey::new(public, secret)
}

/// Verify and remove the trailing SHA-1 or 2-byte checksum of decrypted data.
fn strip_check(plain: &[u8], sha1_check: bool) -> Result<Zeroizing<Vec<u8>>> {
    if sha1_check {
        if plain.len() < 20 {
            return Err(KeyringError::WrongPassphrase);
        }
        let (data, hash) = plain.split_at(plain.len() - 20);
        if Sha1::digest(data).as_slice() != hash {
            return Err(KeyringError::WrongPassphrase);
        }
        Ok(Zeroizing::new(data.to_vec()))
    } else {
        if plain.len() < 2 {
            return Err(KeyringError::WrongPassphrase);
        }
        let (data, sum) = plain.split_at(plain.len() - 2);
        if secret_checksum(data) != u16::from_be_bytes([sum[0], sum[1]]) {
            return Err(KeyringError::WrongPassphrase);
        }
        Ok(Zeroizing::new(data.to_vec()))
    }
}

/// Store `secret` encrypted under `passphrase`; an empty passphrase leaves it
/// unencrypted.
pub fn protect_secret(
    public: &PublicKeyMaterial,
    secret: &SecretParams,
    passphrase: &[u8],
    config: &KeyringConfig,
) -> Result<SecretKeyMaterial> {
    let mpis = secret.to_mpis();
    if passphrase.is_empty() {
        return Ok(SecretKeyMaterial::new(
            public.clone(),
            SecretProtection::unprotected(mpis),
        ));
    }

    let cipher = config.protection_cipher;
    let (key_len, block_len) = match (cipher.key_size(), cipher.block_size()) {
        (Some(k), Some(b)) => (k, b),
        _ => {
            return Err(KeyringError::UnsupportedAlgorithm(format!(
                "cipher {}",
                cipher.id()
            )))
        }
    };

    let mut salt = [0u8; 8];
    OsRng.fill_bytes(&mut salt);
    let mut iv = vec![0u8; block_len];
    OsRng.fill_bytes(&mut iv);
    let s2k = S2k::Iterated {
        hash: config.hash_algorithm,
        salt,
        count: config.s2k_count,
    };
    let key = derive_key(&s2k, passphrase, key_len)?;

    let mut data = Zeroizing::new(mpis.to_vec());
    data.extend_from_slice(&Sha1::digest(&mpis[..]));
    cfb_encrypt(cipher, &key, &iv, &mut data)?;

    Ok(SecretKeyMaterial::new(
        public.clone(),
        SecretProtection::Encrypted {
            usage: 254,
            cipher,
            s2k,
            iv,
            data: data.to_vec(),
        },
    ))
}

/// Generate a fresh key. `bits` applies to RSA and DSA, `curve` to curve keys.
pub fn generate_key(
    algorithm: PublicKeyAlgorithm,
    bits: Option<u32>,
    curve: Option<Curve>,
    creation_time: u32,
) -> Result<UnlockedKey> {
    use PublicKeyAlgorithm::*;
    let unsupported = |what: String| Err(KeyringError::UnsupportedAlgorithm(what));

    let (params, secret) = match (algorithm, curve) {
        (RsaEncryptSign | RsaEncrypt | RsaSign, _) => generate_rsa(bits.unwrap_or(2048))?,
        (Dsa, _) => generate_dsa(bits.unwrap_or(2048))?,
        (Ecdsa, None | Some(Curve::NistP256)) => {
            let signing = p256::ecdsa::SigningKey::random(&mut OsRng);
            let point = signing.verifying_key().to_encoded_point(false);
            (
                curve_params(Ecdsa, Curve::NistP256, point.as_bytes(), None),
                SecretParams::Ecc {
                    scalar: Zeroizing::new(signing.to_bytes().to_vec()),
                },
            )
        }
        (EdDsa, None | Some(Curve::Ed25519)) => {
            let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
            let mut q = vec![0x40];
            q.extend_from_slice(signing.verifying_key().as_bytes());
            (
                curve_params(EdDsa, Curve::Ed25519, &q, None),
                SecretParams::Ecc {
                    scalar: Zeroizing::new(signing.to_bytes().to_vec()),
                },
            )
        }
        (Ecdh, None | Some(Curve::Cv25519)) => {
            let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
            let public = x25519_dalek::PublicKey::from(&secret);
            let mut q = vec![0x40];
            q.extend_from_slice(public.as_bytes());

            // Stored clamped and big-endian.
            let mut scalar = Zeroizing::new(secret.to_bytes().to_vec());
            scalar[0] &= 248;
            scalar[31] &= 127;
            scalar[31] |= 64;
            scalar.reverse();
            (
                curve_params(Ecdh, Curve::Cv25519, &q, Some(&ECDH_KDF_SHA256_AES256)),
                SecretParams::Ecc { scalar },
            )
        }
        (Ecdh, Some(Curve::NistP256)) => {
            use p256::elliptic_curve::sec1::ToEncodedPoint;
            let secret = p256::SecretKey::random(&mut OsRng);
            let point = secret.public_key().to_encoded_point(false);
            (
                curve_params(
                    Ecdh,
                    Curve::NistP256,
                    point.as_bytes(),
                    Some(&ECDH_KDF_SHA256_AES256),
                ),
                SecretParams::Ecc {
                    scalar: Zeroizing::new(secret.to_bytes().to_vec()),
                },
            )
        }
        (ElGamalEncrypt | ElGamalEncryptSign, _) => {
            return unsupported("ElGamal key generation".to_string())
        }
        (Ecdsa | EdDsa | Ecdh, Some(curve)) => {
            return unsupported(format!("curve {curve:?} for {algorithm}"))
        }
        (Unknown(id), _) => return unsupported(format!("algorithm {id}")),
    };

    let public = PublicKeyMaterial::new(creation_time, algorithm, params);
    UnlockedKey::new(public, secret)
}

/// KDF parameters: reserved 0x01, SHA-256, AES-256.
const ECDH_KDF_SHA256_AES256: [u8; 3] = [0x01, 0x08, 0x09];

fn generate_rsa(bits: u32) -> Result<(PublicParams, SecretParams)> {
    let key = RsaPrivateKey::new(&mut OsRng, bits as usize)?;
    let (p, q) = match key.primes() {
        [a, b] if a < b => (a, b),
        [a, b] => (b, a),
        _ => {
            return Err(KeyringError::CryptoError(
                "RSA key generation produced unexpected primes".to_string(),
            ))
        }
    };
    // u = p^-1 mod q, with p < q
    let u = p
        .mod_inverse(q)
        .and_then(|x| x.to_biguint())
        .ok_or_else(|| KeyringError::CryptoError("RSA primes are not coprime".to_string()))?;

    let params = PublicParams::Rsa {
        n: Mpi::new(&key.n().to_bytes_be()),
        e: Mpi::new(&key.e().to_bytes_be()),
    };
    let secret = SecretParams::Rsa {
        d: Zeroizing::new(key.d().to_bytes_be()),
        p: Zeroizing::new(p.to_bytes_be()),
        q: Zeroizing::new(q.to_bytes_be()),
        u: Zeroizing::new(u.to_bytes_be()),
    };
    Ok((params, secret))
}

fn generate_dsa(bits: u32) -> Result<(PublicParams, SecretParams)> {
    #[allow(deprecated)]
    let size = match bits {
        1024 => dsa::KeySize::DSA_1024_160,
        2048 => dsa::KeySize::DSA_2048_256,
        3072 => dsa::KeySize::DSA_3072_256,
        n => {
            return Err(KeyringError::UnsupportedAlgorithm(format!(
                "DSA key size {n}"
            )))
        }
    };
    let components = dsa::Components::generate(&mut OsRng, size);
    let (p, q, g) = (
        Mpi::new(&components.p().to_bytes_be()),
        Mpi::new(&components.q().to_bytes_be()),
        Mpi::new(&components.g().to_bytes_be()),
    );
    let signing = dsa::SigningKey::generate(&mut OsRng, components);
    let y = Mpi::new(&signing.verifying_key().y().to_bytes_be());
    let secret = SecretParams::Dsa {
        x: Zeroizing::new(signing.x().to_bytes_be()),
    };
    Ok((PublicParams::Dsa { p, q, g, y }, secret))
}

/// Reject secret parameters that do not belong to `public`.
fn check_consistency(public: &PublicKeyMaterial, secret: &SecretParams) -> Result<()> {
    let mismatch = || {
        Err(KeyringError::InvalidKey(format!(
            "secret parameters do not match public key {}",
            public.key_id()
        )))
    };

    match (public.params(), secret) {
        (PublicParams::Rsa { n, .. }, SecretParams::Rsa { p, q, .. }) => {
            let product = BigUint::from_bytes_be(p) * BigUint::from_bytes_be(q);
            if product != BigUint::from_bytes_be(n.as_bytes()) {
                return mismatch();
            }
        }
        (PublicParams::Dsa { p, g, y, .. }, SecretParams::Dsa { x }) => {
            let p = BigUint::from_bytes_be(p.as_bytes());
            let derived = BigUint::from_bytes_be(g.as_bytes()).modpow(&BigUint::from_bytes_be(x), &p);
            if derived != BigUint::from_bytes_be(y.as_bytes()) {
                return mismatch();
            }
        }
        (PublicParams::ElGamal { .. }, SecretParams::ElGamal { .. }) => {}
        (PublicParams::EdDsa { q, .. }, SecretParams::Ecc { scalar }) => {
            let seed = padded_secret(scalar, 32);
            let seed: [u8; 32] = seed.as_slice().try_into().map_err(|_| {
                KeyringError::InvalidKey("Ed25519 seed too long".to_string())
            })?;
            let signing = ed25519_dalek::SigningKey::from_bytes(&seed);
            if q.as_bytes().get(1..) != Some(signing.verifying_key().as_bytes().as_slice()) {
                return mismatch();
            }
        }
        (PublicParams::Ecdsa { q, .. }, SecretParams::Ecc { scalar })
            if public.curve() == Some(Curve::NistP256) =>
        {
            let signing = p256::ecdsa::SigningKey::from_slice(&padded_secret(scalar, 32))?;
            let point = signing.verifying_key().to_encoded_point(false);
            if point.as_bytes() != q.as_bytes() {
                return mismatch();
            }
        }
        (PublicParams::Ecdsa { .. } | PublicParams::Ecdh { .. }, SecretParams::Ecc { .. }) => {}
        _ => return mismatch(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::current_unix_timestamp;

    fn fast_config() -> KeyringConfig {
        KeyringConfig::default().with_s2k_count(0x10)
    }

    #[test]
    fn test_protect_and_unlock_ed25519() {
        let key = generate_key(
            PublicKeyAlgorithm::EdDsa,
            None,
            Some(Curve::Ed25519),
            current_unix_timestamp(),
        )
        .unwrap();
        let material = key.protect(b"correct horse", &fast_config()).unwrap();
        assert!(material.is_encrypted());

        let unlocked = unlock_secret(&material, b"correct horse").unwrap();
        assert_eq!(unlocked.public(), key.public());
        assert!(matches!(
            unlock_secret(&material, b"wrong"),
            Err(KeyringError::WrongPassphrase)
        ));
    }

    #[test]
    fn test_empty_passphrase_leaves_key_unencrypted() {
        let key = generate_key(PublicKeyAlgorithm::Ecdsa, None, None, 1_600_000_000).unwrap();
        let material = key.protect(b"", &fast_config()).unwrap();
        assert!(!material.is_encrypted());
        assert!(unlock_secret(&material, b"anything").is_ok());
    }

    #[test]
    fn test_cv25519_generation() {
        let key = generate_key(PublicKeyAlgorithm::Ecdh, None, None, 1_600_000_000).unwrap();
        assert_eq!(key.public().curve(), Some(Curve::Cv25519));
        match key.public().params() {
            PublicParams::Ecdh { kdf, q, .. } => {
                assert_eq!(kdf, &ECDH_KDF_SHA256_AES256.to_vec());
                assert_eq!(q.as_bytes()[0], 0x40);
            }
            other => panic!("unexpected params {other:?}"),
        }
    }

    #[test]
    fn test_stub_is_unavailable() {
        let key = generate_key(PublicKeyAlgorithm::EdDsa, None, None, 1_600_000_000).unwrap();
        let material = key.protect(b"", &fast_config()).unwrap().stripped();
        assert!(matches!(
            unlock_secret(&material, b""),
            Err(KeyringError::SecretKeyUnavailable(_))
        ));
    }

    #[test]
    fn test_unsupported_generation() {
        assert!(matches!(
            generate_key(PublicKeyAlgorithm::ElGamalEncrypt, Some(2048), None, 0),
            Err(KeyringError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            generate_key(PublicKeyAlgorithm::EdDsa, None, Some(Curve::NistP256), 0),
            Err(KeyringError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_mismatched_secret_rejected() {
        let a = generate_key(PublicKeyAlgorithm::EdDsa, None, None, 0).unwrap();
        let b = generate_key(PublicKeyAlgorithm::EdDsa, None, None, 0).unwrap();
        assert!(UnlockedKey::new(a.public().clone(), b.secret().clone()).is_err());
    }
}
