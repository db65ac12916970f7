//! OpenPGP packet codec.
//!
//! Packets are decoded lazily from a byte slice by [`PacketReader`]. Every
//! decoded [`Packet`] keeps its exact original bytes, so re-encoding a decoded
//! packet is the identity. Packets built by this crate are written with
//! new-format headers.

pub mod key;
pub mod mpi;
pub mod signature;
pub mod user;

use crate::error::{KeyringError, Result};

pub use key::{PublicKeyMaterial, PublicParams, S2k, SecretKeyMaterial, SecretProtection};
pub use mpi::Mpi;
pub use signature::{
    CertificationLevel, Signature, SignatureBuilder, SignatureKind, Subpacket, SubpacketValue,
};
pub use user::{UserAttribute, UserId};

/// Packet tags handled by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Signature,
    SecretKey,
    PublicKey,
    SecretSubkey,
    Marker,
    Trust,
    UserId,
    PublicSubkey,
    UserAttribute,
    Other(u8),
}

impl Tag {
    pub fn from_id(id: u8) -> Self {
        match id {
            2 => Tag::Signature,
            5 => Tag::SecretKey,
            6 => Tag::PublicKey,
            7 => Tag::SecretSubkey,
            10 => Tag::Marker,
            12 => Tag::Trust,
            13 => Tag::UserId,
            14 => Tag::PublicSubkey,
            17 => Tag::UserAttribute,
            other => Tag::Other(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Tag::Signature => 2,
            Tag::SecretKey => 5,
            Tag::PublicKey => 6,
            Tag::SecretSubkey => 7,
            Tag::Marker => 10,
            Tag::Trust => 12,
            Tag::UserId => 13,
            Tag::PublicSubkey => 14,
            Tag::UserAttribute => 17,
            Tag::Other(id) => *id,
        }
    }

    /// Tags that start a new keyring in a stream.
    pub fn is_primary_key(&self) -> bool {
        matches!(self, Tag::PublicKey | Tag::SecretKey)
    }
}

/// Decoded packet body.
#[derive(Debug, Clone)]
pub enum PacketBody {
    PublicKey(PublicKeyMaterial),
    PublicSubkey(PublicKeyMaterial),
    SecretKey(SecretKeyMaterial),
    SecretSubkey(SecretKeyMaterial),
    UserId(UserId),
    UserAttribute(UserAttribute),
    Signature(Signature),
    Trust(Vec<u8>),
    Marker,
    Unknown { tag: u8, data: Vec<u8> },
}

impl PacketBody {
    pub fn tag(&self) -> Tag {
        match self {
            PacketBody::PublicKey(_) => Tag::PublicKey,
            PacketBody::PublicSubkey(_) => Tag::PublicSubkey,
            PacketBody::SecretKey(_) => Tag::SecretKey,
            PacketBody::SecretSubkey(_) => Tag::SecretSubkey,
            PacketBody::UserId(_) => Tag::UserId,
            PacketBody::UserAttribute(_) => Tag::UserAttribute,
            PacketBody::Signature(_) => Tag::Signature,
            PacketBody::Trust(_) => Tag::Trust,
            PacketBody::Marker => Tag::Marker,
            PacketBody::Unknown { tag, .. } => Tag::Other(*tag),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            PacketBody::PublicKey(k) | PacketBody::PublicSubkey(k) => k.body().to_vec(),
            PacketBody::SecretKey(k) | PacketBody::SecretSubkey(k) => k.to_bytes(),
            PacketBody::UserId(u) => u.value().to_vec(),
            PacketBody::UserAttribute(a) => a.data().to_vec(),
            PacketBody::Signature(s) => s.body().to_vec(),
            PacketBody::Trust(t) => t.clone(),
            PacketBody::Marker => b"PGP".to_vec(),
            PacketBody::Unknown { data, .. } => data.clone(),
        }
    }

    fn parse(tag: Tag, body: &[u8], offset: usize) -> Result<Self> {
        Ok(match tag {
            Tag::PublicKey => PacketBody::PublicKey(PublicKeyMaterial::parse(body, offset)?),
            Tag::PublicSubkey => PacketBody::PublicSubkey(PublicKeyMaterial::parse(body, offset)?),
            Tag::SecretKey => PacketBody::SecretKey(SecretKeyMaterial::parse(body, offset)?),
            Tag::SecretSubkey => PacketBody::SecretSubkey(SecretKeyMaterial::parse(body, offset)?),
            Tag::UserId => PacketBody::UserId(UserId::new(body.to_vec())),
            Tag::UserAttribute => PacketBody::UserAttribute(UserAttribute::new(body.to_vec())),
            Tag::Signature => PacketBody::Signature(Signature::parse(body, offset)?),
            Tag::Trust => PacketBody::Trust(body.to_vec()),
            Tag::Marker => PacketBody::Marker,
            Tag::Other(tag) => PacketBody::Unknown {
                tag,
                data: body.to_vec(),
            },
        })
    }
}

/// A single packet with its original encoding.
#[derive(Debug, Clone)]
pub struct Packet {
    tag: Tag,
    offset: usize,
    header_len: usize,
    raw: Vec<u8>,
    body: PacketBody,
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Packet {}

impl Packet {
    /// Build a new packet from a body, using a new-format header.
    pub fn new(body: PacketBody) -> Self {
        let tag = body.tag();
        let body_bytes = body.to_bytes();
        let mut raw = Vec::with_capacity(body_bytes.len() + 6);
        write_new_header(&mut raw, tag.id(), body_bytes.len());
        let header_len = raw.len();
        raw.extend_from_slice(&body_bytes);
        Self {
            tag,
            offset: 0,
            header_len,
            raw,
            body,
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Byte offset of this packet in the stream it was decoded from.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn body(&self) -> &PacketBody {
        &self.body
    }

    /// The complete encoded packet, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.clone()
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.raw[self.header_len..]
    }

    pub fn signature(&self) -> Option<&Signature> {
        match &self.body {
            PacketBody::Signature(sig) => Some(sig),
            _ => None,
        }
    }

    /// Public part of a key packet, for public and secret key tags alike.
    pub fn key(&self) -> Option<&PublicKeyMaterial> {
        match &self.body {
            PacketBody::PublicKey(k) | PacketBody::PublicSubkey(k) => Some(k),
            PacketBody::SecretKey(k) | PacketBody::SecretSubkey(k) => Some(k.public()),
            _ => None,
        }
    }

    pub fn secret_key(&self) -> Option<&SecretKeyMaterial> {
        match &self.body {
            PacketBody::SecretKey(k) | PacketBody::SecretSubkey(k) => Some(k),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match &self.body {
            PacketBody::UserId(u) => Some(u),
            _ => None,
        }
    }

    pub fn user_attribute(&self) -> Option<&UserAttribute> {
        match &self.body {
            PacketBody::UserAttribute(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_secret_key(&self) -> bool {
        matches!(self.tag, Tag::SecretKey | Tag::SecretSubkey)
    }
}

/// Concatenate the encodings of `packets`.
pub fn encode(packets: &[Packet]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packets.iter().map(|p| p.raw.len()).sum());
    for packet in packets {
        out.extend_from_slice(&packet.raw);
    }
    out
}

/// Decode all packets of `bytes`, failing on the first malformed one.
pub fn decode(bytes: &[u8]) -> Result<Vec<Packet>> {
    PacketReader::new(bytes).collect()
}

/// Write a new-format packet header.
pub(crate) fn write_new_header(out: &mut Vec<u8>, tag: u8, len: usize) {
    out.push(0xC0 | (tag & 0x3F));
    if len < 192 {
        out.push(len as u8);
    } else if len < 8384 {
        let v = len - 192;
        out.push(((v >> 8) as u8) + 192);
        out.push((v & 0xFF) as u8);
    } else {
        out.push(0xFF);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

/// Lazy, restartable packet decoder over a byte slice.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            failed: false,
        }
    }

    /// Restart decoding from the beginning of the stream.
    pub fn rewind(&mut self) {
        self.pos = 0;
        self.failed = false;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn read_packet(&mut self) -> Result<Packet> {
        let start = self.pos;
        let data = self.data;
        let (tag_id, header_len, body_len) = read_header(&data[start..], start)?;
        if tag_id == 0 {
            return Err(KeyringError::malformed(start, "reserved packet tag 0"));
        }
        let end = start
            .checked_add(header_len)
            .and_then(|v| v.checked_add(body_len))
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                KeyringError::malformed(
                    start,
                    format!("truncated packet body, declared {body_len} bytes"),
                )
            })?;
        let tag = Tag::from_id(tag_id);
        let raw = data[start..end].to_vec();
        let body = PacketBody::parse(tag, &raw[header_len..], start + header_len)?;
        self.pos = end;
        Ok(Packet {
            tag,
            offset: start,
            header_len,
            raw,
            body,
        })
    }
}

impl Iterator for PacketReader<'_> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let result = self.read_packet();
        if result.is_err() {
            // Framing is lost after a decode error, so the stream ends here.
            self.failed = true;
        }
        Some(result)
    }
}

/// Parse a packet header. Returns (tag, header length, body length).
fn read_header(data: &[u8], offset: usize) -> Result<(u8, usize, usize)> {
    let truncated = || KeyringError::malformed(offset, "truncated packet header");
    let first = *data.first().ok_or_else(truncated)?;
    if first & 0x80 == 0 {
        return Err(KeyringError::malformed(
            offset,
            format!("invalid packet header byte {first:#04x}"),
        ));
    }

    if first & 0x40 != 0 {
        // New format
        let tag = first & 0x3F;
        let o1 = *data.get(1).ok_or_else(truncated)? as usize;
        match o1 {
            0..=191 => Ok((tag, 2, o1)),
            192..=223 => {
                let o2 = *data.get(2).ok_or_else(truncated)? as usize;
                Ok((tag, 3, ((o1 - 192) << 8) + o2 + 192))
            }
            255 => {
                let len = data.get(2..6).ok_or_else(truncated)?;
                let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
                Ok((tag, 6, len))
            }
            _ => Err(KeyringError::malformed(
                offset,
                "partial body length not allowed in keyrings",
            )),
        }
    } else {
        // Old format
        let tag = (first >> 2) & 0x0F;
        match first & 0x03 {
            0 => {
                let len = *data.get(1).ok_or_else(truncated)? as usize;
                Ok((tag, 2, len))
            }
            1 => {
                let len = data.get(1..3).ok_or_else(truncated)?;
                Ok((tag, 3, u16::from_be_bytes([len[0], len[1]]) as usize))
            }
            2 => {
                let len = data.get(1..5).ok_or_else(truncated)?;
                let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
                Ok((tag, 5, len))
            }
            _ => Err(KeyringError::malformed(
                offset,
                "indeterminate packet length not allowed in keyrings",
            )),
        }
    }
}

/// Bounds-checked cursor used by the body parsers.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn error(&self, reason: impl Into<String>) -> KeyringError {
        KeyringError::malformed(self.offset(), reason)
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.error(format!(
                "truncated: need {n} bytes, {} left",
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Bytes consumed since position `start`.
    pub(crate) fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.data[start..self.pos]
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_header_lengths() {
        for len in [0usize, 191, 192, 8383, 8384, 100_000] {
            let mut out = Vec::new();
            write_new_header(&mut out, 13, len);
            let (tag, header_len, body_len) = read_header(&out, 0).unwrap();
            assert_eq!(tag, 13);
            assert_eq!(header_len, out.len());
            assert_eq!(body_len, len);
        }
    }

    #[test]
    fn test_old_format_header() {
        // Old format, tag 13 (user id), one-byte length
        let data = [0x80 | (13 << 2), 3, b'a', b'b', b'c'];
        let packets = decode(&data).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].tag(), Tag::UserId);
        assert_eq!(packets[0].user_id().unwrap().value(), b"abc");
        assert_eq!(encode(&packets), data.to_vec());
    }

    #[test]
    fn test_rejects_bad_framing() {
        assert!(matches!(
            decode(&[0x00, 0x01]),
            Err(KeyringError::MalformedPacket { offset: 0, .. })
        ));
        // reserved tag 0
        assert!(decode(&[0xC0, 0x00]).is_err());
        // truncated body
        assert!(decode(&[0xCD, 0x05, b'a']).is_err());
        // partial body length
        assert!(decode(&[0xCD, 0xE1, b'a', b'b']).is_err());
        // indeterminate old-format length
        assert!(decode(&[0x80 | (13 << 2) | 3, b'a']).is_err());
    }

    #[test]
    fn test_reader_stops_after_error_and_rewinds() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0xCD, 0x01, b'x']);
        data.extend_from_slice(&[0xCD, 0x09, b'y']);
        let mut reader = PacketReader::new(&data);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());

        reader.rewind();
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.offset(), 0);
        assert_eq!(first.as_bytes(), &[0xCD, 0x01, b'x']);
    }

    #[test]
    fn test_unknown_tags_are_preserved() {
        let data = [0xC0 | 60, 0x02, 0xAA, 0xBB];
        let packets = decode(&data).unwrap();
        assert_eq!(packets[0].tag(), Tag::Other(60));
        assert_eq!(packets[0].body_bytes(), &[0xAA, 0xBB]);
    }
}
