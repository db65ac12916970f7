//! Canonicalized keyrings and the per-component view derived while building them.

use crate::armor::{self, ArmorKind};
use crate::canonicalize::{canonicalize_with, CanonicalizeOptions};
use crate::error::Result;
use crate::keyring::RawKeyRing;
use crate::oplog::OperationLog;
use crate::packet::{
    self, Packet, PacketBody, PublicKeyMaterial, SecretKeyMaterial, Signature, UserAttribute,
    UserId,
};
use crate::types::{Fingerprint, KeyFlags, KeyId, PublicKeyAlgorithm};

/// A user id that survived canonicalization, with its certification.
#[derive(Debug, Clone)]
pub struct UserIdInfo {
    pub(crate) user_id: UserId,
    pub(crate) certification: Signature,
    pub(crate) primary: bool,
}

impl UserIdInfo {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn certification(&self) -> &Signature {
        &self.certification
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }
}

#[derive(Debug, Clone)]
pub struct UserAttributeInfo {
    pub(crate) attribute: UserAttribute,
    pub(crate) certification: Signature,
}

impl UserAttributeInfo {
    pub fn attribute(&self) -> &UserAttribute {
        &self.attribute
    }

    pub fn certification(&self) -> &Signature {
        &self.certification
    }
}

/// A bound subkey: its key packet, newest valid binding and, if it still
/// applies, its revocation.
#[derive(Debug, Clone)]
pub struct SubkeyInfo {
    pub(crate) key: PublicKeyMaterial,
    pub(crate) packet: Packet,
    pub(crate) binding: Signature,
    pub(crate) revocation: Option<Signature>,
}

impl SubkeyInfo {
    pub fn key(&self) -> &PublicKeyMaterial {
        &self.key
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn key_id(&self) -> KeyId {
        self.key().key_id()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.key().fingerprint()
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.key().algorithm()
    }

    pub fn creation_time(&self) -> u32 {
        self.key().creation_time()
    }

    pub fn binding(&self) -> &Signature {
        &self.binding
    }

    pub fn revocation(&self) -> Option<&Signature> {
        self.revocation.as_ref()
    }

    /// Usage flags of the current binding; empty when the binding has none.
    pub fn key_flags(&self) -> KeyFlags {
        self.binding.key_flags().unwrap_or_default()
    }

    /// Absolute expiry time, if the binding sets one.
    pub fn expiry(&self) -> Option<u32> {
        self.binding
            .key_expiration_time()
            .map(|secs| self.creation_time().saturating_add(secs))
    }

    pub fn is_revoked(&self) -> bool {
        self.revocation.is_some()
    }

    pub fn secret_key(&self) -> Option<&SecretKeyMaterial> {
        self.packet.secret_key()
    }

    /// Whether usable (possibly encrypted) secret material is present.
    pub fn has_secret(&self) -> bool {
        self.secret_key().map(|k| k.is_available()).unwrap_or(false)
    }
}

/// A keyring in canonical form.
///
/// Packets are ordered master key, key-level signatures (newest first), user
/// ids each with one certification, user attributes likewise, then subkeys
/// each with binding and optional revocation (newest first). Instances are
/// only produced by canonicalization and never mutated.
#[derive(Debug, Clone)]
pub struct CanonicalizedKeyRing {
    pub(crate) packets: Vec<Packet>,
    pub(crate) master: PublicKeyMaterial,
    pub(crate) revocation: Option<Signature>,
    pub(crate) direct_key: Option<Signature>,
    pub(crate) user_ids: Vec<UserIdInfo>,
    pub(crate) user_attributes: Vec<UserAttributeInfo>,
    pub(crate) subkeys: Vec<SubkeyInfo>,
    pub(crate) options: CanonicalizeOptions,
}

impl PartialEq for CanonicalizedKeyRing {
    fn eq(&self, other: &Self) -> bool {
        self.packets == other.packets
    }
}

impl CanonicalizedKeyRing {
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn master_key(&self) -> &PublicKeyMaterial {
        &self.master
    }

    pub fn master_key_id(&self) -> KeyId {
        self.master.key_id()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.master.fingerprint()
    }

    pub fn master_secret_key(&self) -> Option<&SecretKeyMaterial> {
        self.packets.first().and_then(|p| p.secret_key())
    }

    pub fn is_secret(&self) -> bool {
        self.master_secret_key().is_some()
    }

    /// Whether the master key carries usable secret material.
    pub fn has_secret(&self) -> bool {
        self.master_secret_key()
            .map(|k| k.is_available())
            .unwrap_or(false)
    }

    pub fn is_revoked(&self) -> bool {
        self.revocation.is_some()
    }

    pub fn revocation(&self) -> Option<&Signature> {
        self.revocation.as_ref()
    }

    pub fn direct_key_signature(&self) -> Option<&Signature> {
        self.direct_key.as_ref()
    }

    pub fn user_ids(&self) -> &[UserIdInfo] {
        &self.user_ids
    }

    /// The primary user id. Canonical rings always have at least one.
    pub fn primary_user_id(&self) -> &UserIdInfo {
        self.user_ids
            .iter()
            .find(|u| u.primary)
            .unwrap_or(&self.user_ids[0])
    }

    pub fn find_user_id(&self, user_id: &UserId) -> Option<&UserIdInfo> {
        self.user_ids.iter().find(|u| &u.user_id == user_id)
    }

    pub fn user_attributes(&self) -> &[UserAttributeInfo] {
        &self.user_attributes
    }

    pub fn subkeys(&self) -> &[SubkeyInfo] {
        &self.subkeys
    }

    pub fn subkey(&self, key_id: KeyId) -> Option<&SubkeyInfo> {
        self.subkeys.iter().find(|s| s.key_id() == key_id)
    }

    /// Master key usage flags, taken from the primary user id certification
    /// and falling back to the direct-key signature.
    pub fn key_flags(&self) -> KeyFlags {
        self.primary_user_id()
            .certification
            .key_flags()
            .or_else(|| self.direct_key.as_ref().and_then(|s| s.key_flags()))
            .unwrap_or_default()
    }

    /// Master key expiry as seconds after key creation, if any.
    pub fn key_expiration(&self) -> Option<u32> {
        self.primary_user_id()
            .certification
            .key_expiration_time()
            .or_else(|| {
                self.direct_key
                    .as_ref()
                    .and_then(|s| s.key_expiration_time())
            })
    }

    /// Absolute master key expiry time, if any.
    pub fn expiry(&self) -> Option<u32> {
        self.key_expiration()
            .map(|secs| self.master.creation_time().saturating_add(secs))
    }

    /// Options this ring was canonicalized with.
    pub fn options(&self) -> &CanonicalizeOptions {
        &self.options
    }

    /// Creation time of the newest signature in the ring.
    pub fn newest_signature_time(&self) -> u32 {
        self.packets
            .iter()
            .filter_map(|p| p.signature())
            .map(|s| s.creation_time())
            .max()
            .unwrap_or(0)
    }

    pub fn encode(&self) -> Vec<u8> {
        packet::encode(&self.packets)
    }

    pub fn armored(&self) -> String {
        let kind = if self.is_secret() {
            ArmorKind::PrivateKey
        } else {
            ArmorKind::PublicKey
        };
        armor::encode(kind, &self.encode(), &[])
    }

    pub fn to_raw(&self) -> RawKeyRing {
        RawKeyRing::from_packets(self.packets.clone())
    }

    /// The ring as it may leave this installation: non-exportable
    /// signatures are removed, along with anything that depended on them.
    pub fn export(&self) -> Result<CanonicalizedKeyRing> {
        let options = self.options.with_export(true);
        canonicalize_with(&self.to_raw(), &options, &mut OperationLog::new())
    }

    /// Public keyring: every secret key packet replaced by its public part.
    pub fn to_public(&self) -> Result<CanonicalizedKeyRing> {
        let packets = self
            .packets
            .iter()
            .map(|p| match p.body() {
                PacketBody::SecretKey(k) => Packet::new(PacketBody::PublicKey(k.public().clone())),
                PacketBody::SecretSubkey(k) => {
                    Packet::new(PacketBody::PublicSubkey(k.public().clone()))
                }
                _ => p.clone(),
            })
            .collect();
        canonicalize_with(
            &RawKeyRing::from_packets(packets),
            &self.options,
            &mut OperationLog::new(),
        )
    }
}
