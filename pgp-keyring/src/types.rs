//! Core types and identifiers for OpenPGP keyrings.
//!
//! Intention: Provide strongly-typed wrappers over the raw numeric ids used on
//! the wire (algorithms, flags, key ids) so the canonicalizer and the key
//! operation engine can match on them exhaustively.

use crate::error::{KeyringError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in seconds since the epoch, clamped to the u32 range used by
/// OpenPGP timestamps.
pub fn current_unix_timestamp() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs.min(u32::MAX as u64) as u32
}

/* -------------------------------- Key Id -------------------------------- */

/// 64-bit key id, the low eight bytes of a v4 fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(pub u64);

impl KeyId {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn to_hex(&self) -> String {
        format!("{:016X}", self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| KeyringError::InvalidKey(format!("Invalid key id hex: {e}")))?;
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyringError::InvalidKey("Invalid key id length".into()))?;
        Ok(Self::from_bytes(arr))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/* ------------------------------ Fingerprint ----------------------------- */

/// v4 fingerprint: SHA-1 over the framed public key packet body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 20]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn key_id(&self) -> KeyId {
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&self.0[12..]);
        KeyId::from_bytes(tail)
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| KeyringError::InvalidKey(format!("Invalid fingerprint hex: {e}")))?;
        let arr: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyringError::InvalidKey("Invalid fingerprint length".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/* ----------------------------- Algorithms ------------------------------- */

/// Public key algorithm ids (RFC 4880 section 9.1, RFC 6637, EdDSA draft).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublicKeyAlgorithm {
    RsaEncryptSign,
    RsaEncrypt,
    RsaSign,
    ElGamalEncrypt,
    Dsa,
    Ecdh,
    Ecdsa,
    ElGamalEncryptSign,
    EdDsa,
    Unknown(u8),
}

impl PublicKeyAlgorithm {
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Self::RsaEncryptSign,
            2 => Self::RsaEncrypt,
            3 => Self::RsaSign,
            16 => Self::ElGamalEncrypt,
            17 => Self::Dsa,
            18 => Self::Ecdh,
            19 => Self::Ecdsa,
            20 => Self::ElGamalEncryptSign,
            22 => Self::EdDsa,
            other => Self::Unknown(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::RsaEncryptSign => 1,
            Self::RsaEncrypt => 2,
            Self::RsaSign => 3,
            Self::ElGamalEncrypt => 16,
            Self::Dsa => 17,
            Self::Ecdh => 18,
            Self::Ecdsa => 19,
            Self::ElGamalEncryptSign => 20,
            Self::EdDsa => 22,
            Self::Unknown(id) => *id,
        }
    }

    /// Whether keys of this algorithm can issue signatures and therefore
    /// certifications. ElGamal type 20 is treated as encrypt-only.
    pub fn can_sign(&self) -> bool {
        matches!(
            self,
            Self::RsaEncryptSign | Self::RsaSign | Self::Dsa | Self::Ecdsa | Self::EdDsa
        )
    }

    pub fn can_encrypt(&self) -> bool {
        matches!(
            self,
            Self::RsaEncryptSign
                | Self::RsaEncrypt
                | Self::ElGamalEncrypt
                | Self::ElGamalEncryptSign
                | Self::Ecdh
        )
    }

    /// Whether the key size is given by a curve rather than a bit length.
    pub fn is_curve_based(&self) -> bool {
        matches!(self, Self::Ecdh | Self::Ecdsa | Self::EdDsa)
    }
}

impl fmt::Display for PublicKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaEncryptSign => write!(f, "RSA"),
            Self::RsaEncrypt => write!(f, "RSA (encrypt only)"),
            Self::RsaSign => write!(f, "RSA (sign only)"),
            Self::ElGamalEncrypt | Self::ElGamalEncryptSign => write!(f, "ElGamal"),
            Self::Dsa => write!(f, "DSA"),
            Self::Ecdh => write!(f, "ECDH"),
            Self::Ecdsa => write!(f, "ECDSA"),
            Self::EdDsa => write!(f, "EdDSA"),
            Self::Unknown(id) => write!(f, "unknown algorithm {id}"),
        }
    }
}

/// Elliptic curves supported for key generation and verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Curve {
    NistP256,
    Ed25519,
    Cv25519,
}

const OID_NIST_P256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const OID_ED25519: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];
const OID_CV25519: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01];

impl Curve {
    pub fn oid(&self) -> &'static [u8] {
        match self {
            Curve::NistP256 => OID_NIST_P256,
            Curve::Ed25519 => OID_ED25519,
            Curve::Cv25519 => OID_CV25519,
        }
    }

    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        [Curve::NistP256, Curve::Ed25519, Curve::Cv25519]
            .into_iter()
            .find(|c| c.oid() == oid)
    }

    /// Nominal strength in bits, reported as the key size of curve keys.
    pub fn bits(&self) -> u32 {
        match self {
            Curve::NistP256 => 256,
            Curve::Ed25519 | Curve::Cv25519 => 255,
        }
    }
}

/// Hash algorithm ids (RFC 4880 section 9.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Ripemd160,
    Sha256,
    Sha384,
    Sha512,
    Sha224,
    Unknown(u8),
}

impl HashAlgorithm {
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Self::Md5,
            2 => Self::Sha1,
            3 => Self::Ripemd160,
            8 => Self::Sha256,
            9 => Self::Sha384,
            10 => Self::Sha512,
            11 => Self::Sha224,
            other => Self::Unknown(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Md5 => 1,
            Self::Sha1 => 2,
            Self::Ripemd160 => 3,
            Self::Sha256 => 8,
            Self::Sha384 => 9,
            Self::Sha512 => 10,
            Self::Sha224 => 11,
            Self::Unknown(id) => *id,
        }
    }
}

/// Symmetric cipher ids (RFC 4880 section 9.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymmetricAlgorithm {
    Plaintext,
    Idea,
    TripleDes,
    Cast5,
    Blowfish,
    Aes128,
    Aes192,
    Aes256,
    Twofish,
    Camellia128,
    Camellia192,
    Camellia256,
    Unknown(u8),
}

impl SymmetricAlgorithm {
    pub fn from_id(id: u8) -> Self {
        match id {
            0 => Self::Plaintext,
            1 => Self::Idea,
            2 => Self::TripleDes,
            3 => Self::Cast5,
            4 => Self::Blowfish,
            7 => Self::Aes128,
            8 => Self::Aes192,
            9 => Self::Aes256,
            10 => Self::Twofish,
            11 => Self::Camellia128,
            12 => Self::Camellia192,
            13 => Self::Camellia256,
            other => Self::Unknown(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Plaintext => 0,
            Self::Idea => 1,
            Self::TripleDes => 2,
            Self::Cast5 => 3,
            Self::Blowfish => 4,
            Self::Aes128 => 7,
            Self::Aes192 => 8,
            Self::Aes256 => 9,
            Self::Twofish => 10,
            Self::Camellia128 => 11,
            Self::Camellia192 => 12,
            Self::Camellia256 => 13,
            Self::Unknown(id) => *id,
        }
    }

    /// Cipher block size, needed to know the IV length of protected keys.
    pub fn block_size(&self) -> Option<usize> {
        match self {
            Self::Idea | Self::TripleDes | Self::Cast5 | Self::Blowfish => Some(8),
            Self::Aes128
            | Self::Aes192
            | Self::Aes256
            | Self::Twofish
            | Self::Camellia128
            | Self::Camellia192
            | Self::Camellia256 => Some(16),
            Self::Plaintext | Self::Unknown(_) => None,
        }
    }

    pub fn key_size(&self) -> Option<usize> {
        match self {
            Self::Aes128 | Self::Camellia128 | Self::Cast5 | Self::Idea | Self::Blowfish => {
                Some(16)
            }
            Self::Aes192 | Self::Camellia192 | Self::TripleDes => Some(24),
            Self::Aes256 | Self::Camellia256 | Self::Twofish => Some(32),
            Self::Plaintext | Self::Unknown(_) => None,
        }
    }
}

/* ------------------------------ Key Flags ------------------------------- */

/// Key usage flags (RFC 4880 section 5.2.3.21), first octet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyFlags(pub u8);

impl KeyFlags {
    pub const CERTIFY: u8 = 0x01;
    pub const SIGN: u8 = 0x02;
    pub const ENCRYPT_COMMS: u8 = 0x04;
    pub const ENCRYPT_STORAGE: u8 = 0x08;
    pub const SPLIT: u8 = 0x10;
    pub const AUTHENTICATE: u8 = 0x20;
    pub const SHARED: u8 = 0x80;

    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub fn certify() -> Self {
        Self(Self::CERTIFY)
    }

    pub fn sign() -> Self {
        Self(Self::SIGN)
    }

    pub fn encrypt() -> Self {
        Self(Self::ENCRYPT_COMMS | Self::ENCRYPT_STORAGE)
    }

    pub fn authenticate() -> Self {
        Self(Self::AUTHENTICATE)
    }

    pub fn with(self, other: KeyFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn can_certify(&self) -> bool {
        self.0 & Self::CERTIFY != 0
    }

    pub fn can_sign(&self) -> bool {
        self.0 & Self::SIGN != 0
    }

    pub fn can_encrypt(&self) -> bool {
        self.0 & (Self::ENCRYPT_COMMS | Self::ENCRYPT_STORAGE) != 0
    }

    pub fn can_authenticate(&self) -> bool {
        self.0 & Self::AUTHENTICATE != 0
    }

    /// Flags that need signing capability of the key algorithm.
    pub fn needs_signing_algorithm(&self) -> bool {
        self.can_certify() || self.can_sign() || self.can_authenticate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_key_id_is_tail() {
        let mut bytes = [0u8; 20];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let fpr = Fingerprint(bytes);
        assert_eq!(fpr.key_id().to_hex(), "0C0D0E0F10111213");
        assert_eq!(Fingerprint::from_hex(&fpr.to_hex()).unwrap(), fpr);
    }

    #[test]
    fn test_algorithm_capabilities() {
        assert!(PublicKeyAlgorithm::RsaEncryptSign.can_sign());
        assert!(!PublicKeyAlgorithm::ElGamalEncrypt.can_sign());
        assert!(!PublicKeyAlgorithm::ElGamalEncryptSign.can_sign());
        assert!(!PublicKeyAlgorithm::Ecdh.can_sign());
        assert!(PublicKeyAlgorithm::EdDsa.is_curve_based());
        assert_eq!(
            PublicKeyAlgorithm::from_id(99),
            PublicKeyAlgorithm::Unknown(99)
        );
        assert_eq!(PublicKeyAlgorithm::from_id(22).id(), 22);
    }

    #[test]
    fn test_curve_oid_lookup() {
        assert_eq!(Curve::from_oid(Curve::Ed25519.oid()), Some(Curve::Ed25519));
        assert_eq!(Curve::from_oid(&[0x01, 0x02]), None);
    }

    #[test]
    fn test_key_flags() {
        let flags = KeyFlags::certify().with(KeyFlags::sign());
        assert!(flags.can_certify());
        assert!(flags.can_sign());
        assert!(!flags.can_encrypt());
        assert!(KeyFlags::encrypt().can_encrypt());
        assert!(!KeyFlags::encrypt().needs_signing_algorithm());
    }
}
