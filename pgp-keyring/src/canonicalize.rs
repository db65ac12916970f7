//! Canonicalization: reduce a raw, possibly hostile keyring to the subset of
//! packets that is cryptographically and temporally valid, in a
//! deterministic order.
//!
//! Only self-signatures by the master key are considered. Among valid
//! signatures of the same kind on the same component the newest wins; equal
//! creation times are decided by the smaller encoded signature, so the result
//! does not depend on input order. A revocation is only overridden by a
//! strictly newer certification or binding.

use crate::config::{KeyringConfig, DEFAULT_FUTURE_TOLERANCE_SECS};
use crate::error::{KeyringError, Result};
use crate::keyring::{
    group_packets, CanonicalizedKeyRing, ComponentId, RawKeyRing, SubkeyInfo, UserAttributeInfo,
    UserIdInfo,
};
use crate::oplog::{LogType, OperationLog};
use crate::packet::{self, Packet, PublicKeyMaterial, Signature, SignatureKind, Tag};
use crate::types::current_unix_timestamp;
use crate::verify::SignatureTarget;
use crate::{log_debug, log_info};
use pgp_common::compact_ids::short_key_label;
use pgp_common::logging::{Component, Logger};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalizeOptions {
    /// Reference time for rejecting future-dated signatures
    pub now: u32,
    /// Treat non-exportable signatures as absent
    pub for_export: bool,
    /// Accepted clock skew for signature creation times, in seconds
    pub future_tolerance_secs: u32,
}

impl Default for CanonicalizeOptions {
    fn default() -> Self {
        Self {
            now: current_unix_timestamp(),
            for_export: false,
            future_tolerance_secs: DEFAULT_FUTURE_TOLERANCE_SECS,
        }
    }
}

impl CanonicalizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &KeyringConfig) -> Self {
        Self {
            future_tolerance_secs: config.future_tolerance_secs,
            ..Self::default()
        }
    }

    pub fn with_now(mut self, now: u32) -> Self {
        self.now = now;
        self
    }

    pub fn with_export(mut self, for_export: bool) -> Self {
        self.for_export = for_export;
        self
    }

    fn latest_acceptable(&self) -> u32 {
        self.now.saturating_add(self.future_tolerance_secs)
    }
}

/// Canonicalize with default options (current time, not for export).
pub fn canonicalize(raw: &RawKeyRing, log: &mut OperationLog) -> Result<CanonicalizedKeyRing> {
    canonicalize_with(raw, &CanonicalizeOptions::default(), log)
}

/// Outcome of checking one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Valid,
    Local,
    BadTime,
    Foreign,
    Bad,
    Unsupported,
}

/// Log entry kinds for rejected signatures in one context.
struct Rejections {
    local: LogType,
    bad_time: LogType,
    foreign: LogType,
    bad: LogType,
    unsupported: LogType,
}

impl Rejections {
    fn kind(&self, verdict: Verdict) -> Option<LogType> {
        match verdict {
            Verdict::Valid => None,
            Verdict::Local => Some(self.local),
            Verdict::BadTime => Some(self.bad_time),
            Verdict::Foreign => Some(self.foreign),
            Verdict::Bad => Some(self.bad),
            Verdict::Unsupported => Some(self.unsupported),
        }
    }
}

const KEY_REJECTIONS: Rejections = Rejections {
    local: LogType::KeySignatureLocal,
    bad_time: LogType::KeySignatureBadTime,
    foreign: LogType::KeySignatureForeign,
    bad: LogType::KeySignatureBad,
    unsupported: LogType::KeySignatureUnsupported,
};

const UID_REJECTIONS: Rejections = Rejections {
    local: LogType::UidLocal,
    bad_time: LogType::UidBadTime,
    foreign: LogType::UidForeign,
    bad: LogType::UidBadSignature,
    unsupported: LogType::UidUnsupported,
};

const SUBKEY_REJECTIONS: Rejections = Rejections {
    local: LogType::SubkeyLocal,
    bad_time: LogType::SubkeyBadTime,
    foreign: LogType::SubkeyForeign,
    bad: LogType::SubkeyBadSignature,
    unsupported: LogType::SubkeyUnsupported,
};

const SUBKEY_REVOCATION_REJECTIONS: Rejections = Rejections {
    bad: LogType::SubkeyRevocationBad,
    ..SUBKEY_REJECTIONS
};

fn is_key_level(kind: SignatureKind) -> bool {
    matches!(kind, SignatureKind::KeyRevocation | SignatureKind::DirectKey)
}

/// A signature packet together with its decoded signature.
#[derive(Clone, Copy)]
struct Signed<'a> {
    packet: &'a Packet,
    sig: &'a Signature,
}

impl<'a> Signed<'a> {
    fn from_packet(packet: &'a Packet) -> Option<Self> {
        packet.signature().map(|sig| Self { packet, sig })
    }

    fn creation_time(&self) -> u32 {
        self.sig.creation_time()
    }

    /// Whether this signature is strictly newer than `other`.
    fn newer_than(&self, other: &Signed<'_>) -> bool {
        self.creation_time() > other.creation_time()
    }
}

/// Newest first; equal times ordered by encoded signature.
fn newest_first(a: &Signed<'_>, b: &Signed<'_>) -> Ordering {
    b.creation_time()
        .cmp(&a.creation_time())
        .then_with(|| a.sig.body().cmp(b.sig.body()))
}

/// A user id, attribute or subkey with its signatures, duplicates merged.
struct Entry<'a> {
    key_packet: &'a Packet,
    signatures: Vec<Signed<'a>>,
    seen: HashSet<&'a [u8]>,
}

impl<'a> Entry<'a> {
    fn new(key_packet: &'a Packet) -> Self {
        Self {
            key_packet,
            signatures: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Add a signature unless an identical one is already present.
    fn push(&mut self, signed: Signed<'a>) -> bool {
        if self.seen.insert(signed.packet.as_bytes()) {
            self.signatures.push(signed);
            true
        } else {
            false
        }
    }
}

struct Canonicalizer<'a, 'l> {
    master: &'a PublicKeyMaterial,
    options: &'a CanonicalizeOptions,
    log: &'l mut OperationLog,
    logger: Logger,
}

impl<'a> Canonicalizer<'a, '_> {
    fn verdict(
        &self,
        sig: &Signature,
        signer: &PublicKeyMaterial,
        target: &SignatureTarget<'_>,
    ) -> Verdict {
        if self.options.for_export && sig.is_local() {
            return Verdict::Local;
        }
        if sig.creation_time() > self.options.latest_acceptable() {
            return Verdict::BadTime;
        }
        if let Some(issuer) = sig.issuer() {
            if issuer != signer.key_id() {
                return Verdict::Foreign;
            }
        }
        if sig.has_unknown_critical_subpacket() {
            return Verdict::Unsupported;
        }
        match sig.verify(signer, target) {
            Ok(true) => Verdict::Valid,
            Ok(false) => Verdict::Bad,
            Err(err) => {
                log_debug!(self.logger, "cannot verify signature: {err}");
                Verdict::Unsupported
            }
        }
    }

    /// Check a master-issued signature, logging the rejection reason.
    fn accept(
        &mut self,
        signed: Signed<'_>,
        target: &SignatureTarget<'_>,
        rejections: &Rejections,
        subject: &str,
    ) -> bool {
        let verdict = self.verdict(signed.sig, self.master, target);
        match rejections.kind(verdict) {
            None => true,
            Some(kind) => {
                self.log.add_with(kind, subject);
                false
            }
        }
    }

    /// Newest valid certification of a user id or attribute, if the
    /// component survives its revocations.
    fn certify_identity(
        &mut self,
        entry: &Entry<'a>,
        target: &SignatureTarget<'_>,
        subject: &str,
    ) -> Option<Signed<'a>> {
        let mut certs = Vec::new();
        let mut revocations = Vec::new();
        for signed in &entry.signatures {
            match signed.sig.kind() {
                SignatureKind::Certification(_) => {
                    if self.accept(*signed, target, &UID_REJECTIONS, subject) {
                        certs.push(*signed);
                    }
                }
                SignatureKind::CertificationRevocation => {
                    if self.accept(*signed, target, &UID_REJECTIONS, subject) {
                        revocations.push(*signed);
                    }
                }
                _ => self.log.add_with(LogType::UidBadType, subject),
            }
        }
        certs.sort_by(newest_first);
        revocations.sort_by(newest_first);

        for _ in certs.iter().skip(1) {
            self.log.add_with(LogType::UidCertDuplicate, subject);
        }
        for _ in revocations.iter().skip(1) {
            self.log.add_with(LogType::UidRevocationDuplicate, subject);
        }

        let Some(cert) = certs.first().copied() else {
            self.log.add_with(LogType::UidNoCertification, subject);
            return None;
        };
        if let Some(revocation) = revocations.first() {
            if cert.newer_than(revocation) {
                self.log.add_with(LogType::UidRevocationOutdated, subject);
            } else {
                self.log.add_with(LogType::UidRevoked, subject);
                return None;
            }
        }
        Some(cert)
    }

    /// Whether `binding` carries a valid primary key binding made by `subkey`.
    fn check_back_signature(
        &mut self,
        binding: &Signature,
        subkey: &PublicKeyMaterial,
        subject: &str,
    ) -> bool {
        let target = SignatureTarget::Subkey {
            master: self.master,
            subkey,
        };
        let embedded: Vec<&Signature> = binding
            .embedded_signatures()
            .into_iter()
            .filter(|s| s.kind() == SignatureKind::PrimaryKeyBinding)
            .collect();
        if embedded.is_empty() {
            self.log.add_with(LogType::SubkeyBackSignatureMissing, subject);
            return false;
        }
        if embedded
            .iter()
            .any(|s| self.verdict(s, subkey, &target) == Verdict::Valid)
        {
            true
        } else {
            self.log.add_with(LogType::SubkeyBackSignatureBad, subject);
            false
        }
    }

    fn bind_subkey(&mut self, entry: &Entry<'a>, is_secret: bool) -> Option<BoundSubkey<'a>> {
        let subkey = entry.key_packet.key()?;
        let subject = subkey.key_id().to_hex();

        if subkey.fingerprint() == self.master.fingerprint() {
            self.log.add_with(LogType::SubkeySameAsMaster, &subject);
            return None;
        }
        if entry.key_packet.is_secret_key() != is_secret {
            self.log.add_with(LogType::SubkeySecretMismatch, &subject);
            return None;
        }

        let target = SignatureTarget::Subkey {
            master: self.master,
            subkey,
        };
        let mut bindings = Vec::new();
        let mut revocations = Vec::new();
        for signed in &entry.signatures {
            match signed.sig.kind() {
                SignatureKind::SubkeyBinding => {
                    if self.accept(*signed, &target, &SUBKEY_REJECTIONS, &subject) {
                        bindings.push(*signed);
                    }
                }
                SignatureKind::SubkeyRevocation => {
                    if self.accept(*signed, &target, &SUBKEY_REVOCATION_REJECTIONS, &subject) {
                        revocations.push(*signed);
                    }
                }
                _ => self.log.add_with(LogType::SubkeyBadType, &subject),
            }
        }
        bindings.sort_by(newest_first);
        revocations.sort_by(newest_first);

        // Newest binding that satisfies the back-signature requirement.
        let mut binding: Option<Signed<'a>> = None;
        for candidate in bindings {
            if binding.is_some() {
                self.log.add_with(LogType::SubkeyBindingDuplicate, &subject);
                continue;
            }
            let needs_back_sig = candidate
                .sig
                .key_flags()
                .map(|f| f.can_sign())
                .unwrap_or(false);
            if !needs_back_sig || self.check_back_signature(candidate.sig, subkey, &subject) {
                binding = Some(candidate);
            }
        }
        let Some(binding) = binding else {
            self.log.add_with(LogType::SubkeyNoBinding, &subject);
            return None;
        };

        for _ in revocations.iter().skip(1) {
            self.log.add_with(LogType::SubkeyRevocationDuplicate, &subject);
        }
        let revocation = match revocations.first().copied() {
            Some(rev) if binding.newer_than(&rev) => {
                self.log.add_with(LogType::SubkeyRevocationOutdated, &subject);
                None
            }
            other => other,
        };

        Some(BoundSubkey {
            key_packet: entry.key_packet,
            key: subkey,
            binding,
            revocation,
        })
    }
}

struct BoundSubkey<'a> {
    key_packet: &'a Packet,
    key: &'a PublicKeyMaterial,
    binding: Signed<'a>,
    revocation: Option<Signed<'a>>,
}

fn fatal(log: &mut OperationLog, kind: LogType, subject: Option<String>) -> KeyringError {
    match subject {
        Some(subject) => log.add_with(kind, subject),
        None => log.add(kind),
    }
    KeyringError::CanonicalizationFailed(kind)
}

fn stray(log: &mut OperationLog, packet: &Packet) {
    log.add_with(
        LogType::StrayPacketDropped,
        format!("{:?} at offset {}", packet.tag(), packet.offset()),
    );
}

/// Key revocations and direct-key signatures, collected from anywhere in the
/// ring since they target the master key alone.
#[derive(Default)]
struct KeyLevel<'a> {
    signatures: Vec<Signed<'a>>,
    seen: HashSet<&'a [u8]>,
}

impl<'a> KeyLevel<'a> {
    /// Take `signed` if it is a key-level signature; false otherwise.
    fn take(&mut self, signed: Signed<'a>, log: &mut OperationLog, subject: &str) -> bool {
        if !is_key_level(signed.sig.kind()) {
            return false;
        }
        if self.seen.insert(signed.packet.as_bytes()) {
            self.signatures.push(signed);
        } else {
            log.add_with(LogType::DuplicatePacketDropped, subject);
        }
        true
    }
}

fn identity_label(packet: &Packet) -> String {
    packet
        .user_id()
        .map(|u| u.to_string_lossy())
        .unwrap_or_else(|| "user attribute".to_string())
}

/// Canonicalize `raw`, appending every dropped or rejected item to `log`.
///
/// Fails only when the master key is missing or cannot certify, or when no
/// user id survives.
pub fn canonicalize_with(
    raw: &RawKeyRing,
    options: &CanonicalizeOptions,
    log: &mut OperationLog,
) -> Result<CanonicalizedKeyRing> {
    let grouped = group_packets(raw.packets());
    let Some(master_group) = grouped.master.as_ref() else {
        return Err(fatal(log, LogType::MasterKeyMissing, None));
    };
    let master_packet = &master_group.key_packet;
    let Some(master) = master_packet.key() else {
        return Err(fatal(log, LogType::MasterKeyMissing, None));
    };
    let is_secret = master_packet.tag() == Tag::SecretKey;
    let master_label = short_key_label(master.fingerprint().as_bytes());

    log.add_with(
        if is_secret {
            LogType::CanonicalizeSecret
        } else {
            LogType::CanonicalizePublic
        },
        &master_label,
    );
    if !master.algorithm().can_sign() {
        return Err(fatal(
            log,
            LogType::MasterKeyAlgorithmInvalid,
            Some(master.algorithm().to_string()),
        ));
    }

    let logger = log.component_logger(Component::Canonicalizer, &master_label);
    let mut c = Canonicalizer {
        master,
        options,
        log,
        logger,
    };
    log_debug!(
        c.logger,
        "{} packets, now={} export={}",
        raw.packets().len(),
        options.now,
        options.for_export
    );

    let mut key_level = KeyLevel::default();
    for packet in grouped.leading.iter().chain(master_group.trailing.iter()) {
        match Signed::from_packet(packet) {
            Some(signed) => {
                if !key_level.take(signed, c.log, &master_label) {
                    c.log.add_with(LogType::OrphanSignatureDropped, &master_label);
                }
            }
            None => stray(c.log, packet),
        }
    }

    let mut entries: Vec<Entry> = Vec::new();
    let mut index: HashMap<ComponentId, usize> = HashMap::new();
    for group in &grouped.components {
        let id = group.id();
        if matches!(id, ComponentId::Master | ComponentId::Other(_)) {
            stray(c.log, &group.key_packet);
            for packet in &group.trailing {
                stray(c.log, packet);
            }
            continue;
        }

        let slot = match index.get(&id).copied() {
            Some(i) => {
                if let ComponentId::Subkey(fpr) = &id {
                    let existing = &mut entries[i];
                    if existing.key_packet.is_secret_key() != is_secret
                        && group.key_packet.is_secret_key() == is_secret
                    {
                        existing.key_packet = &group.key_packet;
                    }
                    c.log.add_with(LogType::SubkeyDuplicate, fpr.key_id().to_hex());
                } else {
                    c.log
                        .add_with(LogType::UidDuplicate, identity_label(&group.key_packet));
                }
                i
            }
            None => {
                index.insert(id, entries.len());
                entries.push(Entry::new(&group.key_packet));
                entries.len() - 1
            }
        };

        for packet in &group.trailing {
            match Signed::from_packet(packet) {
                Some(signed) => {
                    if !key_level.take(signed, c.log, &master_label) && !entries[slot].push(signed)
                    {
                        c.log.add_with(LogType::DuplicatePacketDropped, &master_label);
                    }
                }
                None => stray(c.log, packet),
            }
        }
    }

    // Key revocations and direct-key signatures.
    let key_target = SignatureTarget::Key(master);
    let mut revocations = Vec::new();
    let mut direct = Vec::new();
    for signed in key_level.signatures {
        if c.accept(signed, &key_target, &KEY_REJECTIONS, &master_label) {
            match signed.sig.kind() {
                SignatureKind::KeyRevocation => revocations.push(signed),
                _ => direct.push(signed),
            }
        }
    }
    revocations.sort_by(newest_first);
    direct.sort_by(newest_first);
    for _ in revocations.iter().skip(1) {
        c.log.add_with(LogType::KeyRevocationDuplicate, &master_label);
    }
    for _ in direct.iter().skip(1) {
        c.log.add_with(LogType::DirectKeyDuplicate, &master_label);
    }
    let direct_key = direct.first().copied();
    let revocation = match (revocations.first().copied(), direct_key) {
        (Some(rev), Some(dk)) if dk.newer_than(&rev) => {
            c.log.add_with(LogType::KeyRevocationOutdated, &master_label);
            None
        }
        (rev, _) => rev,
    };

    // User ids and attributes, then subkeys.
    let mut user_ids: Vec<(&Packet, Signed)> = Vec::new();
    let mut attributes: Vec<(&Packet, Signed)> = Vec::new();
    for entry in &entries {
        if let Some(uid) = entry.key_packet.user_id() {
            let subject = uid.to_string_lossy();
            let target = SignatureTarget::UserId(master, uid);
            if let Some(cert) = c.certify_identity(entry, &target, &subject) {
                user_ids.push((entry.key_packet, cert));
            }
        } else if let Some(attr) = entry.key_packet.user_attribute() {
            let target = SignatureTarget::UserAttribute(master, attr);
            if let Some(cert) = c.certify_identity(entry, &target, "user attribute") {
                attributes.push((entry.key_packet, cert));
            }
        }
    }
    let mut subkeys: Vec<BoundSubkey> = Vec::new();
    for entry in &entries {
        if matches!(entry.key_packet.tag(), Tag::PublicSubkey | Tag::SecretSubkey) {
            if let Some(bound) = c.bind_subkey(entry, is_secret) {
                subkeys.push(bound);
            }
        }
    }

    if user_ids.is_empty() {
        return Err(fatal(c.log, LogType::NoValidUserIds, Some(master_label)));
    }

    // The most recent certification flagged primary wins, else the first.
    let primary = user_ids
        .iter()
        .enumerate()
        .filter(|(_, (_, cert))| cert.sig.is_primary_user_id())
        .min_by(|(_, (_, a)), (_, (_, b))| newest_first(a, b))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut packets: Vec<Packet> = vec![master_packet.clone()];
    let mut key_sigs: Vec<Signed> = revocation.into_iter().chain(direct_key).collect();
    key_sigs.sort_by(newest_first);
    packets.extend(key_sigs.iter().map(|s| s.packet.clone()));

    let mut uid_infos = Vec::with_capacity(user_ids.len());
    for (i, (uid_packet, cert)) in user_ids.iter().enumerate() {
        packets.push((*uid_packet).clone());
        packets.push(cert.packet.clone());
        if let Some(uid) = uid_packet.user_id() {
            uid_infos.push(UserIdInfo {
                user_id: uid.clone(),
                certification: cert.sig.clone(),
                primary: i == primary,
            });
        }
    }

    let mut attr_infos = Vec::with_capacity(attributes.len());
    for (attr_packet, cert) in &attributes {
        packets.push((*attr_packet).clone());
        packets.push(cert.packet.clone());
        if let Some(attr) = attr_packet.user_attribute() {
            attr_infos.push(UserAttributeInfo {
                attribute: attr.clone(),
                certification: cert.sig.clone(),
            });
        }
    }

    let mut subkey_infos = Vec::with_capacity(subkeys.len());
    for bound in &subkeys {
        packets.push(bound.key_packet.clone());
        let mut sigs: Vec<Signed> = std::iter::once(bound.binding)
            .chain(bound.revocation)
            .collect();
        sigs.sort_by(newest_first);
        packets.extend(sigs.iter().map(|s| s.packet.clone()));
        subkey_infos.push(SubkeyInfo {
            key: bound.key.clone(),
            packet: bound.key_packet.clone(),
            binding: bound.binding.sig.clone(),
            revocation: bound.revocation.map(|s| s.sig.clone()),
        });
    }

    let unchanged = packet::encode(&packets) == raw.encode();
    c.log.add_with(
        if unchanged {
            LogType::CanonicalizeUnchanged
        } else {
            LogType::CanonicalizeModified
        },
        &master_label,
    );
    log_info!(
        c.logger,
        "{} user ids, {} attributes, {} subkeys; kept {} of {} packets",
        uid_infos.len(),
        attr_infos.len(),
        subkey_infos.len(),
        packets.len(),
        raw.packets().len()
    );
    c.log.add_with(LogType::CanonicalizeSuccess, &master_label);

    Ok(CanonicalizedKeyRing {
        packets,
        master: master.clone(),
        revocation: revocation.map(|s| s.sig.clone()),
        direct_key: direct_key.map(|s| s.sig.clone()),
        user_ids: uid_infos,
        user_attributes: attr_infos,
        subkeys: subkey_infos,
        options: *options,
    })
}
