//! Version 4 signature packets and their subpackets.

use super::mpi::Mpi;
use super::ByteReader;
use crate::crypto::{sign_digest, UnlockedKey};
use crate::error::Result;
use crate::types::{
    Fingerprint, HashAlgorithm, KeyFlags, KeyId, PublicKeyAlgorithm, SymmetricAlgorithm,
};
use crate::verify::{signature_digest, SignatureTarget};

/// Embedded signatures inside embedded signatures are kept opaque.
const MAX_EMBEDDED_DEPTH: usize = 1;

/// Strength of a user id certification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificationLevel {
    /// 0x10, generic certification
    Default,
    /// 0x11, persona: no identity verification
    None,
    /// 0x12
    Casual,
    /// 0x13
    Positive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    Binary,
    Text,
    Standalone,
    Certification(CertificationLevel),
    SubkeyBinding,
    PrimaryKeyBinding,
    DirectKey,
    KeyRevocation,
    SubkeyRevocation,
    CertificationRevocation,
    Timestamp,
    ThirdPartyConfirmation,
    Other(u8),
}

impl SignatureKind {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x00 => Self::Binary,
            0x01 => Self::Text,
            0x02 => Self::Standalone,
            0x10 => Self::Certification(CertificationLevel::Default),
            0x11 => Self::Certification(CertificationLevel::None),
            0x12 => Self::Certification(CertificationLevel::Casual),
            0x13 => Self::Certification(CertificationLevel::Positive),
            0x18 => Self::SubkeyBinding,
            0x19 => Self::PrimaryKeyBinding,
            0x1F => Self::DirectKey,
            0x20 => Self::KeyRevocation,
            0x28 => Self::SubkeyRevocation,
            0x30 => Self::CertificationRevocation,
            0x40 => Self::Timestamp,
            0x50 => Self::ThirdPartyConfirmation,
            other => Self::Other(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Binary => 0x00,
            Self::Text => 0x01,
            Self::Standalone => 0x02,
            Self::Certification(CertificationLevel::Default) => 0x10,
            Self::Certification(CertificationLevel::None) => 0x11,
            Self::Certification(CertificationLevel::Casual) => 0x12,
            Self::Certification(CertificationLevel::Positive) => 0x13,
            Self::SubkeyBinding => 0x18,
            Self::PrimaryKeyBinding => 0x19,
            Self::DirectKey => 0x1F,
            Self::KeyRevocation => 0x20,
            Self::SubkeyRevocation => 0x28,
            Self::CertificationRevocation => 0x30,
            Self::Timestamp => 0x40,
            Self::ThirdPartyConfirmation => 0x50,
            Self::Other(id) => *id,
        }
    }

    pub fn is_certification(&self) -> bool {
        matches!(self, Self::Certification(_))
    }

    pub fn is_revocation(&self) -> bool {
        matches!(
            self,
            Self::KeyRevocation | Self::SubkeyRevocation | Self::CertificationRevocation
        )
    }
}

/// Decoded subpacket contents.
#[derive(Debug, Clone, PartialEq)]
pub enum SubpacketValue {
    SignatureCreationTime(u32),
    SignatureExpirationTime(u32),
    ExportableCertification(bool),
    Revocable(bool),
    KeyExpirationTime(u32),
    PreferredSymmetric(Vec<u8>),
    Issuer(KeyId),
    PreferredHash(Vec<u8>),
    PreferredCompression(Vec<u8>),
    PrimaryUserId(bool),
    KeyFlags(KeyFlags),
    ReasonForRevocation { code: u8, reason: Vec<u8> },
    Features(Vec<u8>),
    EmbeddedSignature(Box<Signature>),
    IssuerFingerprint(Fingerprint),
    Other { tag: u8, data: Vec<u8> },
}

impl SubpacketValue {
    pub fn tag(&self) -> u8 {
        match self {
            Self::SignatureCreationTime(_) => 2,
            Self::SignatureExpirationTime(_) => 3,
            Self::ExportableCertification(_) => 4,
            Self::Revocable(_) => 7,
            Self::KeyExpirationTime(_) => 9,
            Self::PreferredSymmetric(_) => 11,
            Self::Issuer(_) => 16,
            Self::PreferredHash(_) => 21,
            Self::PreferredCompression(_) => 22,
            Self::PrimaryUserId(_) => 25,
            Self::KeyFlags(_) => 27,
            Self::ReasonForRevocation { .. } => 29,
            Self::Features(_) => 30,
            Self::EmbeddedSignature(_) => 32,
            Self::IssuerFingerprint(_) => 33,
            Self::Other { tag, .. } => *tag,
        }
    }

    /// Decode one subpacket body. Known tags with a malformed body are kept
    /// as [`SubpacketValue::Other`], so only the framing of the subpacket
    /// area can fail a signature.
    fn parse(tag: u8, data: &[u8], offset: usize, depth: usize) -> Self {
        let be32 = |d: &[u8]| u32::from_be_bytes([d[0], d[1], d[2], d[3]]);
        let flag = data.first().is_some_and(|b| *b != 0);

        match (tag, data.len()) {
            (2, 4) => Self::SignatureCreationTime(be32(data)),
            (3, 4) => Self::SignatureExpirationTime(be32(data)),
            (4, 1) => Self::ExportableCertification(flag),
            (7, 1) => Self::Revocable(flag),
            (9, 4) => Self::KeyExpirationTime(be32(data)),
            (11, _) => Self::PreferredSymmetric(data.to_vec()),
            (16, 8) => {
                let mut id = [0u8; 8];
                id.copy_from_slice(data);
                Self::Issuer(KeyId::from_bytes(id))
            }
            (21, _) => Self::PreferredHash(data.to_vec()),
            (22, _) => Self::PreferredCompression(data.to_vec()),
            (25, 1) => Self::PrimaryUserId(flag),
            (27, _) => Self::KeyFlags(KeyFlags::new(data.first().copied().unwrap_or(0))),
            (29, 1..) => Self::ReasonForRevocation {
                code: data[0],
                reason: data[1..].to_vec(),
            },
            (30, _) => Self::Features(data.to_vec()),
            (32, _) if depth < MAX_EMBEDDED_DEPTH => {
                match Signature::parse_at_depth(data, offset, depth + 1) {
                    Ok(sig) => Self::EmbeddedSignature(Box::new(sig)),
                    Err(_) => Self::other(tag, data),
                }
            }
            (33, 21) if data[0] == 4 => {
                let mut fpr = [0u8; 20];
                fpr.copy_from_slice(&data[1..]);
                Self::IssuerFingerprint(Fingerprint(fpr))
            }
            _ => Self::other(tag, data),
        }
    }

    fn other(tag: u8, data: &[u8]) -> Self {
        Self::Other {
            tag,
            data: data.to_vec(),
        }
    }

    fn write_data(&self, out: &mut Vec<u8>) {
        match self {
            Self::SignatureCreationTime(t)
            | Self::SignatureExpirationTime(t)
            | Self::KeyExpirationTime(t) => out.extend_from_slice(&t.to_be_bytes()),
            Self::ExportableCertification(b) | Self::Revocable(b) | Self::PrimaryUserId(b) => {
                out.push(*b as u8)
            }
            Self::PreferredSymmetric(d)
            | Self::PreferredHash(d)
            | Self::PreferredCompression(d)
            | Self::Features(d) => out.extend_from_slice(d),
            Self::Issuer(id) => out.extend_from_slice(&id.to_bytes()),
            Self::KeyFlags(flags) => out.push(flags.bits()),
            Self::ReasonForRevocation { code, reason } => {
                out.push(*code);
                out.extend_from_slice(reason);
            }
            Self::EmbeddedSignature(sig) => out.extend_from_slice(sig.body()),
            Self::IssuerFingerprint(fpr) => {
                out.push(4);
                out.extend_from_slice(fpr.as_bytes());
            }
            Self::Other { data, .. } => out.extend_from_slice(data),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subpacket {
    pub critical: bool,
    pub value: SubpacketValue,
}

impl Subpacket {
    pub fn new(value: SubpacketValue) -> Self {
        Self {
            critical: false,
            value,
        }
    }

    pub fn critical(value: SubpacketValue) -> Self {
        Self {
            critical: true,
            value,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        let mut data = Vec::new();
        self.value.write_data(&mut data);
        let len = data.len() + 1;
        if len < 192 {
            out.push(len as u8);
        } else if len < 16320 {
            let v = len - 192;
            out.push(((v >> 8) as u8) + 192);
            out.push((v & 0xFF) as u8);
        } else {
            out.push(0xFF);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
        out.push(self.value.tag() | if self.critical { 0x80 } else { 0 });
        out.extend_from_slice(&data);
    }
}

fn parse_subpackets(area: &[u8], offset: usize, depth: usize) -> Result<Vec<Subpacket>> {
    let mut r = ByteReader::new(area, offset);
    let mut out = Vec::new();
    while !r.is_empty() {
        let first = r.read_u8()? as usize;
        let len = match first {
            0..=191 => first,
            192..=254 => ((first - 192) << 8) + r.read_u8()? as usize + 192,
            _ => r.read_u32()? as usize,
        };
        if len == 0 {
            return Err(r.error("zero-length subpacket"));
        }
        let type_byte = r.read_u8()?;
        let data_offset = r.offset();
        let data = r.take(len - 1)?;
        out.push(Subpacket {
            critical: type_byte & 0x80 != 0,
            value: SubpacketValue::parse(type_byte & 0x7F, data, data_offset, depth),
        });
    }
    Ok(out)
}

fn write_subpackets(subpackets: &[Subpacket]) -> Vec<u8> {
    let mut out = Vec::new();
    for sp in subpackets {
        sp.write(&mut out);
    }
    out
}

/// A version 4 signature. The encoded body is kept so re-encoding is exact.
#[derive(Debug, Clone)]
pub struct Signature {
    kind: SignatureKind,
    algorithm: PublicKeyAlgorithm,
    hash_algorithm: HashAlgorithm,
    hashed: Vec<Subpacket>,
    unhashed: Vec<Subpacket>,
    digest_prefix: [u8; 2],
    mpis: Vec<Mpi>,
    hashed_len: usize,
    body: Vec<u8>,
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl Signature {
    pub(crate) fn parse(body: &[u8], offset: usize) -> Result<Self> {
        Self::parse_at_depth(body, offset, 0)
    }

    fn parse_at_depth(body: &[u8], offset: usize, depth: usize) -> Result<Self> {
        let mut r = ByteReader::new(body, offset);
        let version = r.read_u8()?;
        if version != 4 {
            return Err(r.error(format!("unsupported signature version {version}")));
        }
        let kind = SignatureKind::from_id(r.read_u8()?);
        let algorithm = PublicKeyAlgorithm::from_id(r.read_u8()?);
        let hash_algorithm = HashAlgorithm::from_id(r.read_u8()?);

        let hashed_area_len = r.read_u16()? as usize;
        let hashed_offset = r.offset();
        let hashed = parse_subpackets(r.take(hashed_area_len)?, hashed_offset, depth)?;
        let hashed_len = r.pos();

        let unhashed_area_len = r.read_u16()? as usize;
        let unhashed_offset = r.offset();
        let unhashed = parse_subpackets(r.take(unhashed_area_len)?, unhashed_offset, depth)?;

        let prefix = r.take(2)?;
        let digest_prefix = [prefix[0], prefix[1]];

        let mpi_count = match algorithm {
            PublicKeyAlgorithm::RsaEncryptSign
            | PublicKeyAlgorithm::RsaEncrypt
            | PublicKeyAlgorithm::RsaSign => 1,
            PublicKeyAlgorithm::Dsa
            | PublicKeyAlgorithm::Ecdsa
            | PublicKeyAlgorithm::EdDsa
            | PublicKeyAlgorithm::ElGamalEncryptSign => 2,
            _ => 0,
        };
        let mut mpis = Vec::with_capacity(mpi_count);
        for _ in 0..mpi_count {
            mpis.push(Mpi::read(&mut r)?);
        }
        if mpi_count > 0 && !r.is_empty() {
            return Err(r.error("trailing data after signature"));
        }

        Ok(Self {
            kind,
            algorithm,
            hash_algorithm,
            hashed,
            unhashed,
            digest_prefix,
            mpis,
            hashed_len,
            body: body.to_vec(),
        })
    }

    pub fn kind(&self) -> SignatureKind {
        self.kind
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn hashed_subpackets(&self) -> &[Subpacket] {
        &self.hashed
    }

    pub fn unhashed_subpackets(&self) -> &[Subpacket] {
        &self.unhashed
    }

    /// Left 16 bits of the signed digest.
    pub fn digest_prefix(&self) -> [u8; 2] {
        self.digest_prefix
    }

    pub fn mpis(&self) -> &[Mpi] {
        &self.mpis
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Version, type, algorithms and hashed area: the signed part of the body.
    pub fn hashed_prefix(&self) -> &[u8] {
        &self.body[..self.hashed_len]
    }

    fn hashed_value<T>(&self, f: impl Fn(&SubpacketValue) -> Option<T>) -> Option<T> {
        self.hashed.iter().find_map(|sp| f(&sp.value))
    }

    /// Creation time from the hashed area; 0 when absent.
    pub fn creation_time(&self) -> u32 {
        self.hashed_value(|v| match v {
            SubpacketValue::SignatureCreationTime(t) => Some(*t),
            _ => None,
        })
        .unwrap_or(0)
    }

    /// Absolute expiry time of the signature itself, if any.
    pub fn expiration_time(&self) -> Option<u32> {
        self.hashed_value(|v| match v {
            SubpacketValue::SignatureExpirationTime(t) if *t != 0 => Some(*t),
            _ => None,
        })
        .map(|t| self.creation_time().saturating_add(t))
    }

    /// Key validity period in seconds after key creation; None means no expiry.
    pub fn key_expiration_time(&self) -> Option<u32> {
        self.hashed_value(|v| match v {
            SubpacketValue::KeyExpirationTime(t) if *t != 0 => Some(*t),
            _ => None,
        })
    }

    pub fn key_flags(&self) -> Option<KeyFlags> {
        self.hashed_value(|v| match v {
            SubpacketValue::KeyFlags(f) => Some(*f),
            _ => None,
        })
    }

    pub fn is_exportable(&self) -> bool {
        self.hashed_value(|v| match v {
            SubpacketValue::ExportableCertification(b) => Some(*b),
            _ => None,
        })
        .unwrap_or(true)
    }

    pub fn is_local(&self) -> bool {
        !self.is_exportable()
    }

    pub fn is_revocable(&self) -> bool {
        self.hashed_value(|v| match v {
            SubpacketValue::Revocable(b) => Some(*b),
            _ => None,
        })
        .unwrap_or(true)
    }

    pub fn is_primary_user_id(&self) -> bool {
        self.hashed_value(|v| match v {
            SubpacketValue::PrimaryUserId(b) => Some(*b),
            _ => None,
        })
        .unwrap_or(false)
    }

    pub fn preferred_symmetric(&self) -> Vec<SymmetricAlgorithm> {
        self.hashed_value(|v| match v {
            SubpacketValue::PreferredSymmetric(ids) => {
                Some(ids.iter().map(|id| SymmetricAlgorithm::from_id(*id)).collect())
            }
            _ => None,
        })
        .unwrap_or_default()
    }

    pub fn reason_for_revocation(&self) -> Option<(u8, String)> {
        self.hashed_value(|v| match v {
            SubpacketValue::ReasonForRevocation { code, reason } => {
                Some((*code, String::from_utf8_lossy(reason).into_owned()))
            }
            _ => None,
        })
    }

    /// Issuer key id from either area, falling back to the issuer fingerprint.
    pub fn issuer(&self) -> Option<KeyId> {
        let all = || self.hashed.iter().chain(self.unhashed.iter());
        all()
            .find_map(|sp| match &sp.value {
                SubpacketValue::Issuer(id) => Some(*id),
                _ => None,
            })
            .or_else(|| self.issuer_fingerprint().map(|fpr| fpr.key_id()))
    }

    pub fn issuer_fingerprint(&self) -> Option<Fingerprint> {
        self.hashed
            .iter()
            .chain(self.unhashed.iter())
            .find_map(|sp| match &sp.value {
                SubpacketValue::IssuerFingerprint(fpr) => Some(*fpr),
                _ => None,
            })
    }

    /// Embedded signatures from both areas, hashed first.
    pub fn embedded_signatures(&self) -> Vec<&Signature> {
        self.hashed
            .iter()
            .chain(self.unhashed.iter())
            .filter_map(|sp| match &sp.value {
                SubpacketValue::EmbeddedSignature(sig) => Some(sig.as_ref()),
                _ => None,
            })
            .collect()
    }

    pub fn has_unknown_critical_subpacket(&self) -> bool {
        self.hashed
            .iter()
            .any(|sp| sp.critical && matches!(sp.value, SubpacketValue::Other { .. }))
    }
}

/// Builds and signs new version 4 signatures.
///
/// Issuer key id (unhashed) and issuer fingerprint (hashed) are added from the
/// signing key when [`SignatureBuilder::sign`] runs.
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    kind: SignatureKind,
    hash_algorithm: HashAlgorithm,
    hashed: Vec<Subpacket>,
    unhashed: Vec<Subpacket>,
}

impl SignatureBuilder {
    pub fn new(kind: SignatureKind, creation_time: u32) -> Self {
        Self {
            kind,
            hash_algorithm: HashAlgorithm::Sha256,
            hashed: vec![Subpacket::new(SubpacketValue::SignatureCreationTime(
                creation_time,
            ))],
            unhashed: Vec::new(),
        }
    }

    pub fn hash_algorithm(mut self, hash: HashAlgorithm) -> Self {
        self.hash_algorithm = hash;
        self
    }

    pub fn hashed(mut self, value: SubpacketValue) -> Self {
        self.hashed.push(Subpacket::new(value));
        self
    }

    pub fn unhashed(mut self, value: SubpacketValue) -> Self {
        self.unhashed.push(Subpacket::new(value));
        self
    }

    pub fn key_flags(self, flags: KeyFlags) -> Self {
        self.hashed(SubpacketValue::KeyFlags(flags))
    }

    /// Key expiry as seconds after key creation. Zero or None means no expiry.
    pub fn key_expiration(self, seconds: Option<u32>) -> Self {
        match seconds {
            Some(secs) if secs > 0 => self.hashed(SubpacketValue::KeyExpirationTime(secs)),
            _ => self,
        }
    }

    pub fn primary_user_id(self, primary: bool) -> Self {
        if primary {
            self.hashed(SubpacketValue::PrimaryUserId(true))
        } else {
            self
        }
    }

    /// Algorithm preferences and features advertised on self-signatures.
    pub fn preferences(self) -> Self {
        self.hashed(SubpacketValue::PreferredSymmetric(vec![
            SymmetricAlgorithm::Aes256.id(),
            SymmetricAlgorithm::Aes192.id(),
            SymmetricAlgorithm::Aes128.id(),
            SymmetricAlgorithm::Cast5.id(),
            SymmetricAlgorithm::TripleDes.id(),
        ]))
        .hashed(SubpacketValue::PreferredHash(vec![
            HashAlgorithm::Sha256.id(),
            HashAlgorithm::Sha512.id(),
            HashAlgorithm::Sha384.id(),
            HashAlgorithm::Sha224.id(),
            HashAlgorithm::Sha1.id(),
        ]))
        .hashed(SubpacketValue::PreferredCompression(vec![2, 3, 1]))
        .hashed(SubpacketValue::Features(vec![0x01]))
    }

    pub fn reason_for_revocation(self, code: u8, reason: &str) -> Self {
        self.hashed(SubpacketValue::ReasonForRevocation {
            code,
            reason: reason.as_bytes().to_vec(),
        })
    }

    /// Attach a primary key binding signature, in the unhashed area.
    pub fn embedded_signature(self, sig: Signature) -> Self {
        self.unhashed(SubpacketValue::EmbeddedSignature(Box::new(sig)))
    }

    pub fn sign(self, signer: &UnlockedKey, target: &SignatureTarget<'_>) -> Result<Signature> {
        let public = signer.public();
        let mut hashed = self.hashed;
        hashed.push(Subpacket::new(SubpacketValue::IssuerFingerprint(
            public.fingerprint(),
        )));
        let mut unhashed = self.unhashed;
        unhashed.push(Subpacket::new(SubpacketValue::Issuer(public.key_id())));

        let hashed_area = write_subpackets(&hashed);
        let unhashed_area = write_subpackets(&unhashed);

        let mut body = vec![
            4,
            self.kind.id(),
            public.algorithm().id(),
            self.hash_algorithm.id(),
        ];
        body.extend_from_slice(&(hashed_area.len() as u16).to_be_bytes());
        body.extend_from_slice(&hashed_area);

        let digest = signature_digest(&body, self.hash_algorithm, target)?;
        let mpis = sign_digest(signer, self.hash_algorithm, &digest)?;

        body.extend_from_slice(&(unhashed_area.len() as u16).to_be_bytes());
        body.extend_from_slice(&unhashed_area);
        body.extend_from_slice(&digest[..2]);
        for mpi in &mpis {
            mpi.write(&mut body);
        }
        Signature::parse(&body, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_signature(hashed: &[u8], unhashed: &[u8]) -> Vec<u8> {
        let mut body = vec![4, 0x13, 22, 8];
        body.extend_from_slice(&(hashed.len() as u16).to_be_bytes());
        body.extend_from_slice(hashed);
        body.extend_from_slice(&(unhashed.len() as u16).to_be_bytes());
        body.extend_from_slice(unhashed);
        body.extend_from_slice(&[0xAB, 0xCD]);
        // r and s
        body.extend_from_slice(&[0x00, 0x08, 0x01, 0x00, 0x08, 0x02]);
        body
    }

    #[test]
    fn test_parse_subpackets() {
        let hashed = [
            5, 2, 0x5F, 0x00, 0x00, 0x00, // creation
            2, 27, 0x03, // key flags
            2, 25, 0x01, // primary uid
            2, 0x80 | 100, 0x00, // unknown critical
        ];
        let unhashed = [9, 16, 1, 2, 3, 4, 5, 6, 7, 8];
        let sig = Signature::parse(&raw_signature(&hashed, &unhashed), 0).unwrap();

        assert_eq!(
            sig.kind(),
            SignatureKind::Certification(CertificationLevel::Positive)
        );
        assert_eq!(sig.creation_time(), 0x5F00_0000);
        assert_eq!(sig.key_flags(), Some(KeyFlags::new(0x03)));
        assert!(sig.is_primary_user_id());
        assert!(sig.has_unknown_critical_subpacket());
        assert_eq!(sig.issuer(), Some(KeyId(0x0102_0304_0506_0708)));
        assert_eq!(sig.digest_prefix(), [0xAB, 0xCD]);
        assert_eq!(sig.hashed_prefix().len(), 6 + hashed.len());
        assert!(sig.is_exportable());
    }

    #[test]
    fn test_subpacket_write_matches_parse() {
        let subpackets = vec![
            Subpacket::new(SubpacketValue::SignatureCreationTime(7)),
            Subpacket::critical(SubpacketValue::KeyFlags(KeyFlags::sign())),
            Subpacket::new(SubpacketValue::Other {
                tag: 20,
                data: vec![0x55; 300],
            }),
        ];
        let area = write_subpackets(&subpackets);
        assert_eq!(parse_subpackets(&area, 0, 0).unwrap(), subpackets);
    }

    #[test]
    fn test_rejects_v3_and_bad_framing() {
        let mut body = raw_signature(&[], &[]);
        body[0] = 3;
        assert!(Signature::parse(&body, 0).is_err());

        // zero-length subpacket
        assert!(Signature::parse(&raw_signature(&[0], &[]), 0).is_err());
        // subpacket longer than the area
        assert!(Signature::parse(&raw_signature(&[9, 2, 0, 0], &[]), 0).is_err());
    }

    #[test]
    fn test_malformed_subpacket_bodies_are_kept_opaque() {
        let hashed = [
            3, 2, 0, 0, // creation time, two bytes short
            3, 25, 1, 1, // primary uid flag, one byte long
            2, 16, 7, // issuer, seven bytes short
        ];
        let sig = Signature::parse(&raw_signature(&hashed, &[]), 0).unwrap();

        assert_eq!(sig.creation_time(), 0);
        assert!(!sig.is_primary_user_id());
        assert_eq!(sig.issuer(), None);
        assert_eq!(
            sig.hashed_subpackets()[1].value,
            SubpacketValue::Other {
                tag: 25,
                data: vec![1, 1]
            }
        );
        assert!(!sig.has_unknown_critical_subpacket());
    }

    #[test]
    fn test_local_signature() {
        let sig = Signature::parse(&raw_signature(&[2, 4, 0], &[]), 0).unwrap();
        assert!(sig.is_local());
    }

    #[test]
    fn test_kind_ids() {
        for id in [0x10u8, 0x11, 0x12, 0x13, 0x18, 0x19, 0x1F, 0x20, 0x28, 0x30, 0x77] {
            assert_eq!(SignatureKind::from_id(id).id(), id);
        }
    }
}
