//! Multiprecision integers: a 2-byte bit count followed by big-endian bytes.

use super::ByteReader;
use crate::error::Result;
use zeroize::Zeroizing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mpi {
    bytes: Vec<u8>,
}

impl Mpi {
    /// Build from big-endian bytes, dropping leading zero bytes.
    pub fn new(bytes: &[u8]) -> Self {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        Self {
            bytes: bytes[start..].to_vec(),
        }
    }

    pub(crate) fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let bits = reader.read_u16()? as usize;
        let len = bits.div_ceil(8);
        let bytes = reader.take(len)?;
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Value left-padded with zeros to `len` bytes.
    pub fn to_padded(&self, len: usize) -> Vec<u8> {
        let value = strip_leading_zeros(&self.bytes);
        if value.len() >= len {
            return value.to_vec();
        }
        let mut out = vec![0u8; len - value.len()];
        out.extend_from_slice(value);
        out
    }

    pub fn bit_len(&self) -> usize {
        bit_len(&self.bytes)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_mpi(out, &self.bytes);
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn bit_len(bytes: &[u8]) -> usize {
    let value = strip_leading_zeros(bytes);
    match value.first() {
        Some(first) => (value.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
        None => 0,
    }
}

/// Append an MPI encoding of big-endian `bytes`.
pub(crate) fn write_mpi(out: &mut Vec<u8>, bytes: &[u8]) {
    let value = strip_leading_zeros(bytes);
    out.extend_from_slice(&(bit_len(value) as u16).to_be_bytes());
    out.extend_from_slice(value);
}

/// Read an MPI whose value is secret, keeping it in zeroizing storage.
pub(crate) fn read_secret_mpi(reader: &mut ByteReader<'_>) -> Result<Zeroizing<Vec<u8>>> {
    let bits = reader.read_u16()? as usize;
    let bytes = reader.take(bits.div_ceil(8))?;
    Ok(Zeroizing::new(bytes.to_vec()))
}
