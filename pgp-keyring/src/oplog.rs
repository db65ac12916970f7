//! Append-only operation log returned by canonicalization and key operations.
//!
//! Entries are structured so callers (UI, tests) can assert exact failure
//! reasons. Every entry is mirrored into the attached [`Logger`], if any.

use pgp_common::logging::{Component, Logger};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Ok,
    Warn,
    Error,
}

/// Every message kind the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogType {
    // canonicalization: progress
    CanonicalizePublic,
    CanonicalizeSecret,
    CanonicalizeSuccess,
    CanonicalizeUnchanged,
    CanonicalizeModified,

    // canonicalization: fatal
    MasterKeyMissing,
    MasterKeyAlgorithmInvalid,
    NoValidUserIds,

    // canonicalization: stray packets
    StrayPacketDropped,
    DuplicatePacketDropped,
    OrphanSignatureDropped,

    // canonicalization: key-level signatures
    KeySignatureBadTime,
    KeySignatureForeign,
    KeySignatureBad,
    KeySignatureUnsupported,
    KeySignatureLocal,
    KeyRevocationDuplicate,
    KeyRevocationOutdated,
    DirectKeyDuplicate,

    // canonicalization: user ids and attributes
    UidBadType,
    UidBadTime,
    UidForeign,
    UidBadSignature,
    UidUnsupported,
    UidLocal,
    UidCertDuplicate,
    UidRevocationDuplicate,
    UidRevocationOutdated,
    UidRevoked,
    UidNoCertification,
    UidDuplicate,

    // canonicalization: subkeys
    SubkeyBadType,
    SubkeyBadTime,
    SubkeyForeign,
    SubkeyBadSignature,
    SubkeyUnsupported,
    SubkeyLocal,
    SubkeyBackSignatureMissing,
    SubkeyBackSignatureBad,
    SubkeyBindingDuplicate,
    SubkeyRevocationBad,
    SubkeyRevocationDuplicate,
    SubkeyRevocationOutdated,
    SubkeyNoBinding,
    SubkeyDuplicate,
    SubkeySameAsMaster,
    SubkeySecretMismatch,

    // key operations: create
    CreateStart,
    CreateSuccess,
    MissingSubkey,
    MissingUserId,
    MasterKeyNoCertifyFlag,
    KeyTooSmall,
    UnknownAlgorithm,
    AlgorithmUnsupported,
    ExpiryInPast,
    EmptyUserId,
    KeyGenerated,

    // key operations: modify
    ModifyStart,
    ModifySuccess,
    NotSecretKeyRing,
    MasterKeyIdMismatch,
    FingerprintMismatch,
    MasterKeyUnavailable,
    WrongPassphrase,
    UserIdAdded,
    UserIdRecertified,
    UserIdRevoked,
    UserIdNotFound,
    LastUserIdRevoked,
    PrimaryUserIdChanged,
    PrimaryUserIdRevokedOrMissing,
    SubkeyChanged,
    SubkeyNotFound,
    SubkeyUnavailable,
    SubkeyRevoked,
    MasterKeyRevoked,
    SubkeyAdded,
    PassphraseChanged,
    OperationFailed,

    // merge and batch import
    MergeFingerprintMismatch,
    MergeSuccess,
    BatchStart,
    BatchRingFailed,
    BatchSuccess,
}

impl LogType {
    /// Severity of this kind of entry.
    pub fn level(&self) -> LogLevel {
        use LogType::*;
        match self {
            CanonicalizePublic | CanonicalizeSecret | CreateStart | ModifyStart | BatchStart => {
                LogLevel::Info
            }
            CanonicalizeSuccess | CanonicalizeUnchanged | CanonicalizeModified | CreateSuccess
            | ModifySuccess | MergeSuccess | BatchSuccess => LogLevel::Ok,
            KeyGenerated | UserIdAdded | UserIdRecertified | UserIdRevoked
            | PrimaryUserIdChanged | SubkeyChanged | SubkeyRevoked | MasterKeyRevoked
            | SubkeyAdded | PassphraseChanged => LogLevel::Debug,
            MasterKeyMissing
            | MasterKeyAlgorithmInvalid
            | NoValidUserIds
            | MissingSubkey
            | MissingUserId
            | MasterKeyNoCertifyFlag
            | KeyTooSmall
            | UnknownAlgorithm
            | AlgorithmUnsupported
            | ExpiryInPast
            | EmptyUserId
            | NotSecretKeyRing
            | MasterKeyIdMismatch
            | FingerprintMismatch
            | MasterKeyUnavailable
            | WrongPassphrase
            | UserIdNotFound
            | LastUserIdRevoked
            | PrimaryUserIdRevokedOrMissing
            | SubkeyNotFound
            | SubkeyUnavailable
            | OperationFailed
            | MergeFingerprintMismatch
            | BatchRingFailed => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub kind: LogType,
    /// Key id, user id or other subject the entry refers to
    pub subject: Option<String>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "{:?} {} ({})", self.level, self.kind, subject),
            None => write!(f, "{:?} {}", self.level, self.kind),
        }
    }
}

/// Ordered, append-only list of log entries.
#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
    logger: Option<Arc<Logger>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that mirrors every entry into `logger`.
    pub fn with_logger(logger: Arc<Logger>) -> Self {
        Self {
            entries: Vec::new(),
            logger: Some(logger),
        }
    }

    pub fn logger(&self) -> Option<&Arc<Logger>> {
        self.logger.as_ref()
    }

    /// Logger for one processing step, derived from the attached logger when
    /// there is one.
    pub fn component_logger(&self, component: Component, context_id: &str) -> Logger {
        match &self.logger {
            Some(parent) => parent.with_component(component).with_context(context_id),
            None => Logger::new_root(component, context_id),
        }
    }

    pub fn add(&mut self, kind: LogType) {
        self.push(kind, None);
    }

    pub fn add_with(&mut self, kind: LogType, subject: impl Into<String>) {
        self.push(kind, Some(subject.into()));
    }

    fn push(&mut self, kind: LogType, subject: Option<String>) {
        let entry = LogEntry {
            level: kind.level(),
            kind,
            subject,
        };
        if let Some(logger) = &self.logger {
            match entry.level {
                LogLevel::Debug => logger.debug_args(format_args!("{entry}")),
                LogLevel::Info | LogLevel::Ok => logger.info_args(format_args!("{entry}")),
                LogLevel::Warn => logger.warn_args(format_args!("{entry}")),
                LogLevel::Error => logger.error_args(format_args!("{entry}")),
            }
        }
        self.entries.push(entry);
    }

    /// Append all entries of another log, preserving order.
    pub fn append(&mut self, other: OperationLog) {
        for entry in other.entries {
            self.push(entry.kind, entry.subject);
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, kind: LogType) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    pub fn count(&self, kind: LogType) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.level == LogLevel::Error)
    }

    /// Kinds of all error entries, in order.
    pub fn errors(&self) -> Vec<LogType> {
        self.entries
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .map(|e| e.kind)
            .collect()
    }

    /// Kinds of all warning entries, in order.
    pub fn warnings(&self) -> Vec<LogType> {
        self.entries
            .iter()
            .filter(|e| e.level == LogLevel::Warn)
            .map(|e| e.kind)
            .collect()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_and_queries() {
        let mut log = OperationLog::new();
        log.add(LogType::CanonicalizePublic);
        log.add_with(LogType::UidBadSignature, "alice");
        log.add_with(LogType::UidBadSignature, "bob");
        log.add(LogType::NoValidUserIds);

        assert_eq!(log.len(), 4);
        assert_eq!(log.count(LogType::UidBadSignature), 2);
        assert_eq!(log.warnings(), vec![LogType::UidBadSignature; 2]);
        assert_eq!(log.errors(), vec![LogType::NoValidUserIds]);
        assert!(log.has_errors());
        assert_eq!(log.entries()[1].subject.as_deref(), Some("alice"));
    }

    #[test]
    fn test_append_preserves_order() {
        let mut a = OperationLog::new();
        a.add(LogType::ModifyStart);
        let mut b = OperationLog::new();
        b.add(LogType::CanonicalizeSecret);
        b.add(LogType::CanonicalizeSuccess);
        a.append(b);
        let kinds: Vec<_> = a.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LogType::ModifyStart,
                LogType::CanonicalizeSecret,
                LogType::CanonicalizeSuccess
            ]
        );
    }
}
