//! PGP Keyring – public API facade
//!
//! Decodes OpenPGP transferable keys, reduces them to a canonical form that
//! keeps only self-signatures which verify, and creates or edits secret
//! keyrings by appending freshly signed packets.

#[macro_use]
mod macros;

pub mod armor;
pub mod batch;
pub mod canonicalize;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keyring;
pub mod oplog;
pub mod operation;
pub mod packet;
pub mod types;
pub mod verify;

pub use error::{KeyringError, Result};

pub use types::{
    current_unix_timestamp, Curve, Fingerprint, HashAlgorithm, KeyFlags, KeyId,
    PublicKeyAlgorithm, SymmetricAlgorithm,
};

pub use config::KeyringConfig;

pub use keyring::{
    CanonicalizedKeyRing, KeyRingIterator, RawKeyRing, SubkeyInfo, UserAttributeInfo, UserIdInfo,
};

pub use canonicalize::{canonicalize, canonicalize_with, CanonicalizeOptions};

pub use operation::{
    KeyOperationEngine, OperationResult, Passphrase, SaveKeyRingRequest, SubkeyAdd, SubkeyChange,
};

pub use oplog::{LogEntry, LogLevel, LogType, OperationLog};

pub use batch::{canonicalize_all, read_all, Progress};
