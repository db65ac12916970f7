use super::{key_expiration, KeyOperationEngine, OperationResult, Passphrase, SaveKeyRingRequest};
use crate::crypto::{unlock_secret, UnlockedKey};
use crate::error::{KeyringError, Result};
use crate::keyring::{group_packets, CanonicalizedKeyRing, ComponentId, Group, Grouped, RawKeyRing};
use crate::oplog::{LogType, OperationLog};
use crate::packet::{Packet, PacketBody, Signature, UserId};
use crate::types::{KeyFlags, KeyId};
use crate::{log_debug, log_info, log_warn};
use pgp_common::compact_ids::short_key_label;
use pgp_common::logging::{Component, Logger};

/// State of one modify call: the unlocked master key and the packet groups
/// new signatures are appended to.
struct Session<'a> {
    engine: &'a KeyOperationEngine,
    ring: &'a CanonicalizedKeyRing,
    passphrase: &'a Passphrase,
    master: UnlockedKey,
    groups: Grouped,
    log: OperationLog,
    logger: Logger,
    now: u32,
    /// Creation time of the newest signature, existing or new
    newest: u32,
    master_flags: KeyFlags,
    master_expiration: Option<u32>,
    /// Live user ids in order, with the current primary
    user_ids: Vec<UserId>,
    revoked: Vec<UserId>,
    primary: Option<UserId>,
}

impl KeyOperationEngine {
    /// Apply `request` to a canonical secret keyring.
    ///
    /// Actions run in a fixed order: add user ids, revoke user ids, change
    /// the primary user id, change subkeys, revoke subkeys, add subkeys,
    /// change the passphrase. The returned ring is present only if every
    /// action succeeded.
    pub fn modify_secret_key_ring(
        &self,
        ring: &CanonicalizedKeyRing,
        request: &SaveKeyRingRequest,
        passphrase: &Passphrase,
    ) -> OperationResult {
        let mut log = self.new_log();
        let label = short_key_label(ring.fingerprint().as_bytes());
        let logger = log.component_logger(Component::KeyOperation, &label);
        log.add_with(LogType::ModifyStart, &label);

        let master = match self.check_preconditions(ring, request, passphrase, &mut log) {
            Some(master) => master,
            None => return OperationResult::failure(log),
        };

        let now = self.now();
        let primary = ring.primary_user_id().user_id().clone();
        let mut session = Session {
            engine: self,
            ring,
            passphrase,
            master,
            groups: group_packets(ring.packets()),
            log,
            logger,
            now,
            newest: ring.newest_signature_time(),
            master_flags: ring.key_flags(),
            master_expiration: ring.key_expiration(),
            user_ids: ring.user_ids().iter().map(|u| u.user_id().clone()).collect(),
            revoked: Vec::new(),
            primary: Some(primary),
        };
        log_debug!(
            session.logger,
            "modify: +{} uids, -{} uids, {} subkey changes, -{} subkeys, +{} subkeys",
            request.add_user_ids.len(),
            request.revoke_user_ids.len(),
            request.change_subkeys.len(),
            request.revoke_subkeys.len(),
            request.add_subkeys.len()
        );

        session.add_user_ids(request);
        session.revoke_user_ids(request);
        session.change_primary_user_id(request);
        session.change_subkeys(request);
        session.revoke_subkeys(request);
        session.add_subkeys(request);
        session.change_passphrase(request);
        session.finish()
    }

    fn check_preconditions(
        &self,
        ring: &CanonicalizedKeyRing,
        request: &SaveKeyRingRequest,
        passphrase: &Passphrase,
        log: &mut OperationLog,
    ) -> Option<UnlockedKey> {
        let Some(secret) = ring.master_secret_key() else {
            log.add(LogType::NotSecretKeyRing);
            return None;
        };
        if request.master_key_id != Some(ring.master_key_id()) {
            log.add_with(LogType::MasterKeyIdMismatch, ring.master_key_id().to_hex());
            return None;
        }
        if request.fingerprint != Some(ring.fingerprint()) {
            log.add_with(LogType::FingerprintMismatch, ring.fingerprint().to_hex());
            return None;
        }
        if !secret.is_available() {
            log.add(LogType::MasterKeyUnavailable);
            return None;
        }
        match unlock_secret(secret, passphrase.as_bytes()) {
            Ok(master) => Some(master),
            Err(KeyringError::WrongPassphrase) => {
                log.add(LogType::WrongPassphrase);
                None
            }
            Err(KeyringError::SecretKeyUnavailable(_)) => {
                log.add(LogType::MasterKeyUnavailable);
                None
            }
            Err(err) => {
                log.add_with(LogType::OperationFailed, err.to_string());
                None
            }
        }
    }
}

impl Session<'_> {
    /// Timestamp for the next signature: strictly after every signature so
    /// far, and not before now.
    fn stamp(&mut self) -> u32 {
        let time = self.now.max(self.newest.saturating_add(1));
        self.newest = time;
        time
    }

    fn group_mut(&mut self, id: &ComponentId) -> Option<&mut Group> {
        self.groups.components.iter_mut().find(|g| &g.id() == id)
    }

    fn master_group_mut(&mut self) -> Option<&mut Group> {
        self.groups.master.as_mut()
    }

    /// Append `sig` after the component `id`.
    fn append(&mut self, id: &ComponentId, sig: Signature) {
        let packet = Packet::new(PacketBody::Signature(sig));
        match id {
            ComponentId::Master => {
                if let Some(group) = self.master_group_mut() {
                    group.trailing.push(packet);
                }
            }
            _ => {
                if let Some(group) = self.group_mut(id) {
                    group.trailing.push(packet);
                }
            }
        }
    }

    fn fail(&mut self, kind: LogType, subject: impl Into<String>, err: Option<KeyringError>) {
        let subject = subject.into();
        match err {
            Some(err) => log_warn!(self.logger, "{kind} for {subject}: {err}"),
            None => log_warn!(self.logger, "{kind} for {subject}"),
        }
        self.log.add_with(kind, subject);
    }

    fn certify(&mut self, user_id: &UserId, primary: bool) -> Result<()> {
        let time = self.stamp();
        let cert = self.engine.certify_user_id(
            &self.master,
            user_id,
            self.master_flags,
            self.master_expiration,
            primary,
            time,
        )?;
        let id = ComponentId::UserId(user_id.value().to_vec());
        if self.group_mut(&id).is_none() {
            let uid_packet = Packet::new(PacketBody::UserId(user_id.clone()));
            self.groups.components.push(Group::new(uid_packet));
        }
        self.append(&id, cert);
        Ok(())
    }

    /// Re-certify every live user id, flagging only the current primary.
    fn recertify_all(&mut self) -> Result<()> {
        for user_id in self.user_ids.clone() {
            let primary = self.primary.as_ref() == Some(&user_id);
            self.certify(&user_id, primary)?;
            self.log
                .add_with(LogType::UserIdRecertified, user_id.to_string_lossy());
        }
        Ok(())
    }

    fn add_user_ids(&mut self, request: &SaveKeyRingRequest) {
        for value in &request.add_user_ids {
            if value.is_empty() {
                self.fail(LogType::EmptyUserId, "", None);
                continue;
            }
            let user_id = UserId::from(value.as_str());
            // Re-adding a live user id must not drop its primary flag.
            let primary = self.primary.as_ref() == Some(&user_id);
            match self.certify(&user_id, primary) {
                Ok(()) => {
                    if !self.user_ids.contains(&user_id) {
                        self.user_ids.push(user_id);
                    }
                    self.log.add_with(LogType::UserIdAdded, value.clone());
                }
                Err(err) => self.fail(LogType::OperationFailed, value.clone(), Some(err)),
            }
        }
    }

    fn revoke_user_ids(&mut self, request: &SaveKeyRingRequest) {
        for value in &request.revoke_user_ids {
            let user_id = UserId::from(value.as_str());
            if !self.user_ids.contains(&user_id) {
                self.fail(LogType::UserIdNotFound, value.clone(), None);
                continue;
            }
            if self.user_ids.len() == 1 {
                self.fail(LogType::LastUserIdRevoked, value.clone(), None);
                continue;
            }
            let time = self.stamp();
            match self.engine.revoke_user_id(&self.master, &user_id, time) {
                Ok(sig) => {
                    self.append(&ComponentId::UserId(user_id.value().to_vec()), sig);
                    self.user_ids.retain(|u| u != &user_id);
                    if self.primary.as_ref() == Some(&user_id) {
                        self.primary = None;
                    }
                    self.revoked.push(user_id);
                    self.log.add_with(LogType::UserIdRevoked, value.clone());
                }
                Err(err) => self.fail(LogType::OperationFailed, value.clone(), Some(err)),
            }
        }
    }

    fn change_primary_user_id(&mut self, request: &SaveKeyRingRequest) {
        let Some(value) = &request.change_primary_user_id else {
            return;
        };
        let user_id = UserId::from(value.as_str());
        if self.revoked.contains(&user_id) || !self.user_ids.contains(&user_id) {
            self.fail(LogType::PrimaryUserIdRevokedOrMissing, value.clone(), None);
            return;
        }
        self.primary = Some(user_id);
        match self.recertify_all() {
            Ok(()) => self
                .log
                .add_with(LogType::PrimaryUserIdChanged, value.clone()),
            Err(err) => self.fail(LogType::OperationFailed, value.clone(), Some(err)),
        }
    }

    /// Expiry validation shared by subkey changes; `Some(0)` clears it.
    fn check_expiry(&mut self, expiry: Option<u32>, subject: &str) -> bool {
        match expiry {
            Some(e) if e != 0 && e <= self.now => {
                self.fail(LogType::ExpiryInPast, subject, None);
                false
            }
            _ => true,
        }
    }

    fn unlock_subkey(&self, key_id: KeyId) -> Result<UnlockedKey> {
        let secret = self
            .ring
            .subkey(key_id)
            .and_then(|s| s.secret_key())
            .ok_or_else(|| KeyringError::SecretKeyUnavailable(key_id.to_hex()))?;
        unlock_secret(secret, self.passphrase.as_bytes())
    }

    fn change_subkeys(&mut self, request: &SaveKeyRingRequest) {
        let ring = self.ring;
        for change in &request.change_subkeys {
            let subject = change.key_id.to_hex();
            if !self.check_expiry(change.expiry, &subject) {
                continue;
            }

            if change.key_id == ring.master_key_id() {
                let flags = change.flags.unwrap_or(self.master_flags);
                if !flags.can_certify() {
                    self.fail(LogType::MasterKeyNoCertifyFlag, subject, None);
                    continue;
                }
                self.master_flags = flags;
                if let Some(expiry) = change.expiry {
                    self.master_expiration =
                        key_expiration(expiry, ring.master_key().creation_time());
                }
                match self.recertify_all() {
                    Ok(()) => self.log.add_with(LogType::SubkeyChanged, subject),
                    Err(err) => self.fail(LogType::OperationFailed, subject, Some(err)),
                }
                continue;
            }

            let Some(info) = ring.subkey(change.key_id) else {
                self.fail(LogType::SubkeyNotFound, subject, None);
                continue;
            };
            let flags = change.flags.unwrap_or_else(|| info.key_flags());
            let expiration = match change.expiry {
                Some(expiry) => key_expiration(expiry, info.creation_time()),
                None => info.binding().key_expiration_time(),
            };
            let key = info.key().clone();
            let fingerprint = info.fingerprint();

            let subkey_secret = if flags.can_sign() {
                match self.unlock_subkey(change.key_id) {
                    Ok(unlocked) => Some(unlocked),
                    Err(err) => {
                        self.fail(LogType::SubkeyUnavailable, subject, Some(err));
                        continue;
                    }
                }
            } else {
                None
            };

            let time = self.stamp();
            match self.engine.bind_subkey(
                &self.master,
                &key,
                subkey_secret.as_ref(),
                flags,
                expiration,
                time,
            ) {
                Ok(sig) => {
                    self.append(&ComponentId::Subkey(fingerprint), sig);
                    self.log.add_with(LogType::SubkeyChanged, subject);
                }
                Err(err) => self.fail(LogType::OperationFailed, subject, Some(err)),
            }
        }
    }

    fn revoke_subkeys(&mut self, request: &SaveKeyRingRequest) {
        let ring = self.ring;
        for key_id in &request.revoke_subkeys {
            let subject = key_id.to_hex();
            if *key_id == ring.master_key_id() {
                let time = self.stamp();
                match self.engine.revoke_key(&self.master, None, time) {
                    Ok(sig) => {
                        self.append(&ComponentId::Master, sig);
                        self.log.add_with(LogType::MasterKeyRevoked, subject);
                    }
                    Err(err) => self.fail(LogType::OperationFailed, subject, Some(err)),
                }
                continue;
            }

            let Some(info) = ring.subkey(*key_id) else {
                self.fail(LogType::SubkeyNotFound, subject, None);
                continue;
            };
            let key = info.key().clone();
            let time = self.stamp();
            match self.engine.revoke_key(&self.master, Some(&key), time) {
                Ok(sig) => {
                    self.append(&ComponentId::Subkey(key.fingerprint()), sig);
                    self.log.add_with(LogType::SubkeyRevoked, subject);
                }
                Err(err) => self.fail(LogType::OperationFailed, subject, Some(err)),
            }
        }
    }

    fn add_subkeys(&mut self, request: &SaveKeyRingRequest) {
        // New subkeys are stored under the passphrase the ring ends up with.
        let passphrase = request
            .new_passphrase
            .clone()
            .unwrap_or_else(|| self.passphrase.clone());

        for add in &request.add_subkeys {
            if !self.engine.validate_subkey(add, self.now, &mut self.log) {
                continue;
            }
            let time = self.stamp();
            let result = self.engine.generate(add, self.now).and_then(|subkey| {
                let binding = self.engine.bind_subkey(
                    &self.master,
                    subkey.public(),
                    Some(&subkey),
                    add.flags,
                    key_expiration(add.expiry, subkey.public().creation_time()),
                    time,
                )?;
                let packet = self.engine.secret_packet(&subkey, &passphrase, false)?;
                Ok((subkey.public().key_id(), packet, binding))
            });
            match result {
                Ok((key_id, packet, binding)) => {
                    let mut group = Group::new(packet);
                    group
                        .trailing
                        .push(Packet::new(PacketBody::Signature(binding)));
                    self.groups.components.push(group);
                    self.log.add_with(LogType::SubkeyAdded, key_id.to_hex());
                }
                Err(KeyringError::UnsupportedAlgorithm(msg)) => {
                    self.fail(LogType::AlgorithmUnsupported, msg, None)
                }
                Err(err) => self.fail(
                    LogType::OperationFailed,
                    add.algorithm.to_string(),
                    Some(err),
                ),
            }
        }
    }

    /// Re-protect the master key and every subkey present at the start of
    /// the call. Stubs and smartcard keys are left as they are.
    fn change_passphrase(&mut self, request: &SaveKeyRingRequest) {
        let Some(new_passphrase) = &request.new_passphrase else {
            return;
        };

        match self
            .engine
            .secret_packet(&self.master, new_passphrase, true)
        {
            Ok(packet) => {
                if let Some(group) = self.master_group_mut() {
                    group.key_packet = packet;
                }
            }
            Err(err) => {
                self.fail(LogType::OperationFailed, "master key", Some(err));
                return;
            }
        }

        let ring = self.ring;
        for info in ring.subkeys() {
            if !info.has_secret() {
                continue;
            }
            let subject = info.key_id().to_hex();
            let unlocked = match self.unlock_subkey(info.key_id()) {
                Ok(unlocked) => unlocked,
                Err(KeyringError::WrongPassphrase) => {
                    self.fail(LogType::WrongPassphrase, subject, None);
                    continue;
                }
                Err(err) => {
                    self.fail(LogType::SubkeyUnavailable, subject, Some(err));
                    continue;
                }
            };
            match self.engine.secret_packet(&unlocked, new_passphrase, false) {
                Ok(packet) => {
                    if let Some(group) = self.group_mut(&ComponentId::Subkey(info.fingerprint())) {
                        group.key_packet = packet;
                    }
                }
                Err(err) => self.fail(LogType::OperationFailed, subject, Some(err)),
            }
        }
        self.log.add(LogType::PassphraseChanged);
    }

    fn finish(self) -> OperationResult {
        let Session {
            mut log,
            logger,
            groups,
            ..
        } = self;

        if log.has_errors() {
            log_warn!(logger, "modify failed: {:?}", log.errors());
            return OperationResult::failure(log);
        }

        let mut packets = Vec::new();
        packets.extend(groups.leading);
        if let Some(master) = groups.master {
            packets.extend(master.flatten());
        }
        for group in groups.components {
            packets.extend(group.flatten());
        }
        log_info!(logger, "modify produced {} packets", packets.len());
        log.add(LogType::ModifySuccess);
        OperationResult::success(RawKeyRing::from_packets(packets), log)
    }
}
