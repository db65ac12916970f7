//! Cryptographic primitives used by the keyring engine.
//!
//! Hashing, passphrase-based secret key protection (S2K + CFB), key
//! generation, signing and signature verification, implemented on the
//! RustCrypto crates.

mod secret;
mod sign;

pub use secret::{generate_key, protect_secret, unlock_secret, SecretParams, UnlockedKey};
pub use sign::{sign_digest, verify_digest};

use crate::error::{KeyringError, Result};
use crate::packet::S2k;
use crate::types::{HashAlgorithm, SymmetricAlgorithm};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

/// Running digest over one of the supported hash algorithms.
#[derive(Clone)]
pub enum HashContext {
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl HashContext {
    pub fn new(algorithm: HashAlgorithm) -> Result<Self> {
        Ok(match algorithm {
            HashAlgorithm::Sha1 => HashContext::Sha1(Sha1::new()),
            HashAlgorithm::Sha224 => HashContext::Sha224(Sha224::new()),
            HashAlgorithm::Sha256 => HashContext::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => HashContext::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => HashContext::Sha512(Sha512::new()),
            other => {
                return Err(KeyringError::UnsupportedAlgorithm(format!(
                    "hash algorithm {}",
                    other.id()
                )))
            }
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            HashContext::Sha1(h) => h.update(data),
            HashContext::Sha224(h) => h.update(data),
            HashContext::Sha256(h) => h.update(data),
            HashContext::Sha384(h) => h.update(data),
            HashContext::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            HashContext::Sha1(h) => h.finalize().to_vec(),
            HashContext::Sha224(h) => h.finalize().to_vec(),
            HashContext::Sha256(h) => h.finalize().to_vec(),
            HashContext::Sha384(h) => h.finalize().to_vec(),
            HashContext::Sha512(h) => h.finalize().to_vec(),
        }
    }

    pub fn output_size(&self) -> usize {
        match self {
            HashContext::Sha1(_) => 20,
            HashContext::Sha224(_) => 28,
            HashContext::Sha256(_) => 32,
            HashContext::Sha384(_) => 48,
            HashContext::Sha512(_) => 64,
        }
    }
}

/// Derive a symmetric key of `key_len` bytes from a passphrase.
pub fn derive_key(s2k: &S2k, passphrase: &[u8], key_len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut key = Zeroizing::new(Vec::with_capacity(key_len));
    let mut preload = 0usize;
    while key.len() < key_len {
        let mut ctx = HashContext::new(s2k.hash())?;
        // Each additional context is preloaded with one more zero octet.
        ctx.update(&vec![0u8; preload]);
        match s2k {
            S2k::Simple { .. } => ctx.update(passphrase),
            S2k::Salted { salt, .. } => {
                ctx.update(salt);
                ctx.update(passphrase);
            }
            S2k::Iterated { salt, count, .. } => {
                let mut input = Zeroizing::new(Vec::with_capacity(salt.len() + passphrase.len()));
                input.extend_from_slice(salt);
                input.extend_from_slice(passphrase);
                let total = S2k::decode_count(*count).max(input.len());
                let mut remaining = total;
                while remaining > 0 {
                    let n = remaining.min(input.len());
                    ctx.update(&input[..n]);
                    remaining -= n;
                }
            }
        }
        let digest = Zeroizing::new(ctx.finalize());
        let take = (key_len - key.len()).min(digest.len());
        key.extend_from_slice(&digest[..take]);
        preload += 1;
    }
    Ok(key)
}

/// CFB-encrypt `data` in place.
pub fn cfb_encrypt(cipher: SymmetricAlgorithm, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    let invalid = |_| KeyringError::CryptoError("invalid cipher key or IV length".to_string());
    match cipher {
        SymmetricAlgorithm::Aes128 => cfb_mode::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt(data),
        SymmetricAlgorithm::Aes192 => cfb_mode::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt(data),
        SymmetricAlgorithm::Aes256 => cfb_mode::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt(data),
        other => {
            return Err(KeyringError::UnsupportedAlgorithm(format!(
                "cipher {}",
                other.id()
            )))
        }
    }
    Ok(())
}

/// CFB-decrypt `data` in place.
pub fn cfb_decrypt(cipher: SymmetricAlgorithm, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    let invalid = |_| KeyringError::CryptoError("invalid cipher key or IV length".to_string());
    match cipher {
        SymmetricAlgorithm::Aes128 => cfb_mode::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt(data),
        SymmetricAlgorithm::Aes192 => cfb_mode::Decryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt(data),
        SymmetricAlgorithm::Aes256 => cfb_mode::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt(data),
        other => {
            return Err(KeyringError::UnsupportedAlgorithm(format!(
                "cipher {}",
                other.id()
            )))
        }
    }
    Ok(())
}
