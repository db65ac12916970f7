use thiserror::Error;

use crate::oplog::LogType;

/// Error types for the pgp-keyring crate
#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("Malformed packet at offset {offset}: {reason}")]
    MalformedPacket { offset: usize, reason: String },

    #[error("Expected exactly one keyring, found {0}")]
    NotExactlyOneKeyRing(usize),

    #[error("Armor error: {0}")]
    ArmorError(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Wrong passphrase")]
    WrongPassphrase,

    #[error("Secret key material unavailable: {0}")]
    SecretKeyUnavailable(String),

    #[error("Canonicalization failed: {0:?}")]
    CanonicalizationFailed(LogType),

    #[error("Keyring mismatch: {0}")]
    KeyRingMismatch(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl KeyringError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        KeyringError::MalformedPacket {
            offset,
            reason: reason.into(),
        }
    }
}

impl From<rsa::Error> for KeyringError {
    fn from(err: rsa::Error) -> Self {
        KeyringError::CryptoError(format!("RSA error: {}", err))
    }
}

impl From<ecdsa::Error> for KeyringError {
    fn from(err: ecdsa::Error) -> Self {
        KeyringError::CryptoError(err.to_string())
    }
}

impl From<base64::DecodeError> for KeyringError {
    fn from(err: base64::DecodeError) -> Self {
        KeyringError::ArmorError(err.to_string())
    }
}

/// Result type for pgp-keyring operations
pub type Result<T> = std::result::Result<T, KeyringError>;
