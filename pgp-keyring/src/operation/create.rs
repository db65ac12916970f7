use super::{key_expiration, KeyOperationEngine, OperationResult, SaveKeyRingRequest};
use crate::error::{KeyringError, Result};
use crate::keyring::RawKeyRing;
use crate::oplog::{LogType, OperationLog};
use crate::packet::{Packet, PacketBody, UserId};
use crate::{log_error, log_info};
use pgp_common::compact_ids::short_key_label;
use pgp_common::logging::{Component, Logger};

impl KeyOperationEngine {
    /// Generate a new secret keyring.
    ///
    /// The first entry of `add_subkeys` becomes the master key and must be
    /// able to certify. Every user id gets a positive self-certification
    /// carrying the master key's flags and expiry; the first one (or
    /// `change_primary_user_id`) is marked primary.
    pub fn create_secret_key_ring(&self, request: &SaveKeyRingRequest) -> OperationResult {
        let mut log = self.new_log();
        let logger = log.component_logger(Component::KeyOperation, "new");
        let now = self.now();
        log.add(LogType::CreateStart);

        let mut ok = true;
        if request.add_subkeys.is_empty() {
            log.add(LogType::MissingSubkey);
            ok = false;
        }
        if request.add_user_ids.is_empty() {
            log.add(LogType::MissingUserId);
            ok = false;
        }
        if let Some(master) = request.add_subkeys.first() {
            if !master.flags.can_certify() {
                log.add_with(LogType::MasterKeyNoCertifyFlag, master.algorithm.to_string());
                ok = false;
            }
            if !master.algorithm.can_sign() {
                log.add_with(
                    LogType::MasterKeyAlgorithmInvalid,
                    master.algorithm.to_string(),
                );
                ok = false;
            }
        }
        for add in &request.add_subkeys {
            ok &= self.validate_subkey(add, now, &mut log);
        }
        for user_id in &request.add_user_ids {
            if user_id.is_empty() {
                log.add(LogType::EmptyUserId);
                ok = false;
            }
        }
        let primary = match &request.change_primary_user_id {
            None => 0,
            Some(wanted) => match request.add_user_ids.iter().position(|u| u == wanted) {
                Some(i) => i,
                None => {
                    log.add_with(LogType::PrimaryUserIdRevokedOrMissing, wanted.clone());
                    ok = false;
                    0
                }
            },
        };
        if !ok {
            return OperationResult::failure(log);
        }

        match self.build_new_ring(request, primary, now, &mut log, &logger) {
            Ok(ring) => {
                log.add(LogType::CreateSuccess);
                OperationResult::success(ring, log)
            }
            Err(err) => {
                log_error!(logger, "key creation failed: {err}");
                let kind = match err {
                    KeyringError::UnsupportedAlgorithm(_) => LogType::AlgorithmUnsupported,
                    _ => LogType::OperationFailed,
                };
                log.add_with(kind, err.to_string());
                OperationResult::failure(log)
            }
        }
    }

    fn build_new_ring(
        &self,
        request: &SaveKeyRingRequest,
        primary: usize,
        now: u32,
        log: &mut OperationLog,
        logger: &Logger,
    ) -> Result<RawKeyRing> {
        let Some((master_add, subkey_adds)) = request.add_subkeys.split_first() else {
            return Err(KeyringError::InvalidOperation(
                "no master key requested".to_string(),
            ));
        };
        let passphrase = request.new_passphrase.clone().unwrap_or_default();

        let master = self.generate(master_add, now)?;
        let label = short_key_label(master.public().fingerprint().as_bytes());
        let logger = logger.with_context(label.as_str());
        log.add_with(LogType::KeyGenerated, &label);
        log_info!(
            logger,
            "master key {} generated, {} user ids, {} subkeys",
            master.public().algorithm(),
            request.add_user_ids.len(),
            subkey_adds.len()
        );

        let master_expiration = key_expiration(master_add.expiry, now);
        let mut packets = vec![self.secret_packet(&master, &passphrase, true)?];

        for (i, value) in request.add_user_ids.iter().enumerate() {
            let user_id = UserId::from(value.as_str());
            let cert = self.certify_user_id(
                &master,
                &user_id,
                master_add.flags,
                master_expiration,
                i == primary,
                now,
            )?;
            packets.push(Packet::new(PacketBody::UserId(user_id)));
            packets.push(Packet::new(PacketBody::Signature(cert)));
            log.add_with(LogType::UserIdAdded, value.clone());
        }

        for add in subkey_adds {
            let subkey = self.generate(add, now)?;
            let key_id = subkey.public().key_id().to_hex();
            log.add_with(LogType::KeyGenerated, &key_id);
            let binding = self.bind_subkey(
                &master,
                subkey.public(),
                Some(&subkey),
                add.flags,
                key_expiration(add.expiry, now),
                now,
            )?;
            packets.push(self.secret_packet(&subkey, &passphrase, false)?);
            packets.push(Packet::new(PacketBody::Signature(binding)));
            log.add_with(LogType::SubkeyAdded, key_id);
        }

        Ok(RawKeyRing::from_packets(packets))
    }
}
