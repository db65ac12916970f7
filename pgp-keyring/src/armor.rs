//! ASCII armor (RFC 4880 section 6): base64 body with a CRC-24 checksum.

use crate::error::{KeyringError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;

const LINE_WIDTH: usize = 64;
const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmorKind {
    PublicKey,
    PrivateKey,
    Signature,
    Message,
}

impl ArmorKind {
    fn label(&self) -> &'static str {
        match self {
            ArmorKind::PublicKey => "PGP PUBLIC KEY BLOCK",
            ArmorKind::PrivateKey => "PGP PRIVATE KEY BLOCK",
            ArmorKind::Signature => "PGP SIGNATURE",
            ArmorKind::Message => "PGP MESSAGE",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        [
            ArmorKind::PublicKey,
            ArmorKind::PrivateKey,
            ArmorKind::Signature,
            ArmorKind::Message,
        ]
        .into_iter()
        .find(|k| k.label() == label)
    }
}

impl fmt::Display for ArmorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One decoded armor block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmoredBlock {
    pub kind: ArmorKind,
    pub headers: Vec<(String, String)>,
    pub data: Vec<u8>,
}

pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for byte in data {
        crc ^= (*byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

/// Armor `data` as a block of `kind` with optional headers.
pub fn encode(kind: ArmorKind, data: &[u8], headers: &[(&str, &str)]) -> String {
    let mut out = format!("-----BEGIN {}-----\n", kind.label());
    for (key, value) in headers {
        out.push_str(&format!("{key}: {value}\n"));
    }
    out.push('\n');

    let body = STANDARD.encode(data);
    for chunk in body.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII, so chunk boundaries are char boundaries
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }

    let crc = crc24(data).to_be_bytes();
    out.push('=');
    out.push_str(&STANDARD.encode(&crc[1..]));
    out.push('\n');
    out.push_str(&format!("-----END {}-----\n", kind.label()));
    out
}

/// Decode the first armor block in `text`.
pub fn decode(text: &str) -> Result<ArmoredBlock> {
    decode_all(text)?
        .into_iter()
        .next()
        .ok_or_else(|| KeyringError::ArmorError("no armor block found".to_string()))
}

/// Decode every armor block in `text`, in order. Text outside blocks is ignored.
pub fn decode_all(text: &str) -> Result<Vec<ArmoredBlock>> {
    let mut blocks = Vec::new();
    let mut lines = text.lines().map(|l| l.trim_end());

    while let Some(line) = lines.next() {
        let Some(label) = line
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
        else {
            continue;
        };
        let kind = ArmorKind::from_label(label)
            .ok_or_else(|| KeyringError::ArmorError(format!("unknown armor type '{label}'")))?;

        let mut headers = Vec::new();
        let mut body = String::new();
        let mut checksum: Option<&str> = None;
        let mut in_headers = true;
        let mut ended = false;

        for line in lines.by_ref() {
            if let Some(end) = line
                .strip_prefix("-----END ")
                .and_then(|rest| rest.strip_suffix("-----"))
            {
                if end != label {
                    return Err(KeyringError::ArmorError(format!(
                        "armor END '{end}' does not match BEGIN '{label}'"
                    )));
                }
                ended = true;
                break;
            }
            if in_headers {
                if line.is_empty() {
                    in_headers = false;
                    continue;
                }
                if let Some((key, value)) = line.split_once(": ") {
                    headers.push((key.to_string(), value.to_string()));
                    continue;
                }
                in_headers = false;
            }
            if let Some(sum) = line.strip_prefix('=') {
                checksum = Some(sum);
            } else {
                body.push_str(line.trim());
            }
        }
        if !ended {
            return Err(KeyringError::ArmorError(format!(
                "missing armor END line for {label}"
            )));
        }

        let data = STANDARD.decode(body.as_bytes())?;
        if let Some(sum) = checksum {
            let expected = STANDARD.decode(sum.as_bytes())?;
            let actual = crc24(&data).to_be_bytes();
            if expected.as_slice() != &actual[1..] {
                return Err(KeyringError::ArmorError("CRC-24 checksum mismatch".to_string()));
            }
        }
        blocks.push(ArmoredBlock {
            kind,
            headers,
            data,
        });
    }
    Ok(blocks)
}

/// Whether `bytes` look like ASCII armor rather than binary packets.
pub fn is_armored(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"-----BEGIN PGP")
}

/// Binary packets of `bytes`: armored input is decoded (all blocks
/// concatenated), binary input is returned unchanged.
pub fn dearmor_if_needed(bytes: &[u8]) -> Result<Vec<u8>> {
    if !is_armored(bytes) {
        return Ok(bytes.to_vec());
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| KeyringError::ArmorError(format!("armor is not valid UTF-8: {e}")))?;
    let mut out = Vec::new();
    for block in decode_all(text)? {
        out.extend_from_slice(&block.data);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc24_known_value() {
        assert_eq!(crc24(b""), CRC24_INIT);
        assert_eq!(crc24(b"123456789"), 0x21CF02);
    }

    #[test]
    fn test_encode_decode() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let text = encode(ArmorKind::PublicKey, &data, &[("Comment", "test key")]);
        assert!(text.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----\n"));
        assert!(text
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .all(|l| l.len() <= LINE_WIDTH));

        let block = decode(&text).unwrap();
        assert_eq!(block.kind, ArmorKind::PublicKey);
        assert_eq!(block.data, data);
        assert_eq!(
            block.headers,
            vec![("Comment".to_string(), "test key".to_string())]
        );
    }

    #[test]
    fn test_checksum_mismatch() {
        let text = encode(ArmorKind::Signature, b"abc", &[]);
        let broken = text.replace("YWJj", "YWJk");
        assert!(matches!(decode(&broken), Err(KeyringError::ArmorError(_))));
    }

    #[test]
    fn test_missing_end_and_mismatched_end() {
        let text = "-----BEGIN PGP MESSAGE-----\n\nYWJj\n";
        assert!(decode(text).is_err());
        let text = "-----BEGIN PGP MESSAGE-----\n\nYWJj\n-----END PGP SIGNATURE-----\n";
        assert!(decode(text).is_err());
    }

    #[test]
    fn test_multiple_blocks_and_dearmor() {
        let mut text = encode(ArmorKind::PublicKey, b"first", &[]);
        text.push_str("some text between blocks\n");
        text.push_str(&encode(ArmorKind::PublicKey, b"second", &[]));

        let blocks = decode_all(&text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(dearmor_if_needed(text.as_bytes()).unwrap(), b"firstsecond".to_vec());
        assert_eq!(dearmor_if_needed(&[0x99, 0x01]).unwrap(), vec![0x99, 0x01]);
    }
}
