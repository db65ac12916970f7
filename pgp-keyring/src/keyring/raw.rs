//! Uncanonicalized keyrings: an ordered packet list as found in the input.

use crate::armor::{self, ArmorKind};
use crate::error::{KeyringError, Result};
use crate::packet::{self, Packet, PacketReader, PublicKeyMaterial, Tag};
use crate::types::{Fingerprint, KeyId};
use std::collections::{HashMap, HashSet};

/// One keyring exactly as decoded: master key packet first, then everything
/// up to the next master key packet. Packets keep their original bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RawKeyRing {
    packets: Vec<Packet>,
}

impl RawKeyRing {
    /// Wrap a packet list without validation; canonicalization reports
    /// structural problems.
    pub fn from_packets(packets: Vec<Packet>) -> Self {
        Self { packets }
    }

    /// Decode exactly one keyring from binary or armored bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut rings = Self::decode_all(bytes)?;
        if rings.len() != 1 {
            return Err(KeyringError::NotExactlyOneKeyRing(rings.len()));
        }
        Ok(rings.remove(0))
    }

    /// Decode every keyring in a binary or armored stream.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<Self>> {
        let binary = armor::dearmor_if_needed(bytes)?;
        KeyRingIterator::new(&binary).collect()
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn into_packets(self) -> Vec<Packet> {
        self.packets
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

    fn master_packet(&self) -> Option<&Packet> {
        self.packets.first().filter(|p| p.tag().is_primary_key())
    }

    pub fn master_key(&self) -> Option<&PublicKeyMaterial> {
        self.master_packet().and_then(|p| p.key())
    }

    pub fn master_key_id(&self) -> Option<KeyId> {
        self.master_key().map(|k| k.key_id())
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.master_key().map(|k| k.fingerprint())
    }

    /// Whether the master key packet is a secret key packet.
    pub fn is_secret(&self) -> bool {
        self.master_packet()
            .map(|p| p.tag() == Tag::SecretKey)
            .unwrap_or(false)
    }

    /// Union of two copies of the same keyring.
    ///
    /// Packets are grouped by the component they follow; identical packets are
    /// kept once and secret key packets replace their public counterparts.
    /// The result is not canonical.
    pub fn merge(&self, other: &RawKeyRing) -> Result<RawKeyRing> {
        match (self.fingerprint(), other.fingerprint()) {
            (Some(a), Some(b)) if a == b => {}
            (a, b) => {
                return Err(KeyringError::KeyRingMismatch(format!(
                    "cannot merge keyrings {} and {}",
                    a.map(|f| f.to_hex()).unwrap_or_else(|| "<none>".to_string()),
                    b.map(|f| f.to_hex()).unwrap_or_else(|| "<none>".to_string()),
                )))
            }
        }

        let ours = group_packets(&self.packets);
        let theirs = group_packets(&other.packets);

        let mut master = ours.master.clone();
        if let Some(candidate) = theirs.master.as_ref() {
            if candidate.key_packet.is_secret_key() && !master_is_secret(&master) {
                if let Some(m) = master.as_mut() {
                    m.key_packet = candidate.key_packet.clone();
                }
            }
        }
        let mut master = master.ok_or_else(|| {
            KeyringError::KeyRingMismatch("keyring has no master key".to_string())
        })?;
        if let Some(theirs_master) = theirs.master {
            master.absorb(theirs_master.trailing);
        }

        let mut components: Vec<Group> = Vec::new();
        let mut index: HashMap<ComponentId, usize> = HashMap::new();
        for group in ours.components.into_iter().chain(theirs.components) {
            let id = group.id();
            match index.get(&id) {
                Some(&i) => {
                    let existing = &mut components[i];
                    if group.key_packet.is_secret_key() && !existing.key_packet.is_secret_key() {
                        existing.key_packet = group.key_packet.clone();
                    }
                    existing.absorb(group.trailing);
                }
                None => {
                    index.insert(id, components.len());
                    let mut fresh = Group::new(group.key_packet);
                    fresh.absorb(group.trailing);
                    components.push(fresh);
                }
            }
        }

        let mut packets = master.flatten();
        for group in components {
            packets.extend(group.flatten());
        }
        Ok(RawKeyRing::from_packets(packets))
    }
}

fn master_is_secret(master: &Option<Group>) -> bool {
    master
        .as_ref()
        .map(|m| m.key_packet.is_secret_key())
        .unwrap_or(false)
}

/// Identity of a keyring component, used to merge duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ComponentId {
    Master,
    UserId(Vec<u8>),
    UserAttribute(Vec<u8>),
    Subkey(Fingerprint),
    /// Packets that cannot start a component keep their own bytes as identity
    Other(Vec<u8>),
}

/// A component packet and the packets following it.
#[derive(Debug, Clone)]
pub(crate) struct Group {
    pub(crate) key_packet: Packet,
    pub(crate) trailing: Vec<Packet>,
}

impl Group {
    pub(crate) fn new(key_packet: Packet) -> Self {
        Self {
            key_packet,
            trailing: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> ComponentId {
        let p = &self.key_packet;
        match p.tag() {
            Tag::PublicKey | Tag::SecretKey => ComponentId::Master,
            Tag::PublicSubkey | Tag::SecretSubkey => match p.key() {
                Some(key) => ComponentId::Subkey(key.fingerprint()),
                None => ComponentId::Other(p.to_bytes()),
            },
            Tag::UserId => ComponentId::UserId(p.body_bytes().to_vec()),
            Tag::UserAttribute => ComponentId::UserAttribute(p.body_bytes().to_vec()),
            _ => ComponentId::Other(p.to_bytes()),
        }
    }

    /// Append packets not already present.
    fn absorb(&mut self, packets: Vec<Packet>) {
        let mut seen: HashSet<Vec<u8>> = self.trailing.iter().map(|p| p.to_bytes()).collect();
        for packet in packets {
            if seen.insert(packet.to_bytes()) {
                self.trailing.push(packet);
            }
        }
    }

    pub(crate) fn flatten(self) -> Vec<Packet> {
        let mut out = Vec::with_capacity(self.trailing.len() + 1);
        out.push(self.key_packet);
        out.extend(self.trailing);
        out
    }
}

/// A keyring split into its master group and component groups, in input order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Grouped {
    pub(crate) master: Option<Group>,
    /// Packets preceding the master key, if it is not first
    pub(crate) leading: Vec<Packet>,
    pub(crate) components: Vec<Group>,
}

fn starts_component(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::UserId | Tag::UserAttribute | Tag::PublicSubkey | Tag::SecretSubkey
    )
}

pub(crate) fn group_packets(packets: &[Packet]) -> Grouped {
    let mut grouped = Grouped::default();
    for packet in packets {
        let tag = packet.tag();
        if tag.is_primary_key() && grouped.master.is_none() && grouped.components.is_empty() {
            grouped.master = Some(Group::new(packet.clone()));
        } else if starts_component(tag) {
            grouped.components.push(Group::new(packet.clone()));
        } else if let Some(last) = grouped.components.last_mut() {
            last.trailing.push(packet.clone());
        } else if let Some(master) = grouped.master.as_mut() {
            master.trailing.push(packet.clone());
        } else {
            grouped.leading.push(packet.clone());
        }
    }
    grouped
}

/// Splits a packet stream into consecutive keyrings.
///
/// A new ring starts at every public or secret master key packet. Marker
/// packets before the first ring are skipped; any other leading packet is an
/// error. Iteration stops after the first error.
#[derive(Debug, Clone)]
pub struct KeyRingIterator<'a> {
    reader: PacketReader<'a>,
    pending: Option<Packet>,
    done: bool,
}

impl<'a> KeyRingIterator<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: PacketReader::new(bytes),
            pending: None,
            done: false,
        }
    }

    fn fail(&mut self, err: KeyringError) -> Option<Result<RawKeyRing>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for KeyRingIterator<'_> {
    type Item = Result<RawKeyRing>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let master = match self.pending.take() {
            Some(packet) => packet,
            None => loop {
                match self.reader.next() {
                    None => {
                        self.done = true;
                        return None;
                    }
                    Some(Err(err)) => return self.fail(err),
                    Some(Ok(packet)) if packet.tag() == Tag::Marker => continue,
                    Some(Ok(packet)) if packet.tag().is_primary_key() => break packet,
                    Some(Ok(packet)) => {
                        return self.fail(KeyringError::malformed(
                            packet.offset(),
                            format!("keyring starts with {:?} packet", packet.tag()),
                        ))
                    }
                }
            },
        };

        let mut packets = vec![master];
        loop {
            match self.reader.next() {
                None => {
                    self.done = true;
                    break;
                }
                Some(Err(err)) => return self.fail(err),
                Some(Ok(packet)) if packet.tag().is_primary_key() => {
                    self.pending = Some(packet);
                    break;
                }
                Some(Ok(packet)) => packets.push(packet),
            }
        }
        Some(Ok(RawKeyRing::from_packets(packets)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketBody, PublicParams, UserId};
    use crate::types::PublicKeyAlgorithm;

    fn key_packet(seed: u8) -> Packet {
        Packet::new(PacketBody::PublicKey(PublicKeyMaterial::new(
            1_600_000_000,
            PublicKeyAlgorithm::EdDsa,
            PublicParams::Opaque(vec![seed; 4]),
        )))
    }

    fn uid_packet(value: &str) -> Packet {
        Packet::new(PacketBody::UserId(UserId::from(value)))
    }

    #[test]
    fn test_iterator_splits_rings_and_skips_markers() {
        let mut stream = Packet::new(PacketBody::Marker).to_bytes();
        stream.extend(key_packet(1).to_bytes());
        stream.extend(uid_packet("a").to_bytes());
        stream.extend(key_packet(2).to_bytes());
        stream.extend(uid_packet("b").to_bytes());

        let rings: Vec<_> = KeyRingIterator::new(&stream)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0].packets().len(), 2);
        assert_eq!(rings[1].packets()[1], uid_packet("b"));
    }

    #[test]
    fn test_iterator_rejects_leading_user_id() {
        let stream = uid_packet("a").to_bytes();
        let mut iter = KeyRingIterator::new(&stream);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_decode_requires_exactly_one_ring() {
        let mut stream = key_packet(1).to_bytes();
        stream.extend(key_packet(2).to_bytes());
        assert!(matches!(
            RawKeyRing::decode(&stream),
            Err(KeyringError::NotExactlyOneKeyRing(2))
        ));
        assert!(matches!(
            RawKeyRing::decode(&[]),
            Err(KeyringError::NotExactlyOneKeyRing(0))
        ));
    }

    #[test]
    fn test_merge_unions_components() {
        let a = RawKeyRing::from_packets(vec![key_packet(1), uid_packet("a")]);
        let b = RawKeyRing::from_packets(vec![key_packet(1), uid_packet("b"), uid_packet("a")]);
        let merged = a.merge(&b).unwrap();
        assert_eq!(
            merged.packets(),
            &[key_packet(1), uid_packet("a"), uid_packet("b")]
        );
        assert_eq!(merged.merge(&merged).unwrap(), merged);
    }

    #[test]
    fn test_merge_rejects_other_key() {
        let a = RawKeyRing::from_packets(vec![key_packet(1)]);
        let b = RawKeyRing::from_packets(vec![key_packet(2)]);
        assert!(matches!(a.merge(&b), Err(KeyringError::KeyRingMismatch(_))));
    }
}
