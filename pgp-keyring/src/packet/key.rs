//! Public and secret key packet bodies (version 4 only).

use super::mpi::Mpi;
use super::ByteReader;
use crate::error::Result;
use crate::types::{Curve, Fingerprint, HashAlgorithm, KeyId, PublicKeyAlgorithm, SymmetricAlgorithm};
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

/// Algorithm-specific public parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicParams {
    Rsa { n: Mpi, e: Mpi },
    Dsa { p: Mpi, q: Mpi, g: Mpi, y: Mpi },
    ElGamal { p: Mpi, g: Mpi, y: Mpi },
    Ecdh { oid: Vec<u8>, q: Mpi, kdf: Vec<u8> },
    Ecdsa { oid: Vec<u8>, q: Mpi },
    EdDsa { oid: Vec<u8>, q: Mpi },
    /// Parameters of an algorithm this crate does not interpret
    Opaque(Vec<u8>),
}

impl PublicParams {
    fn read(algorithm: PublicKeyAlgorithm, r: &mut ByteReader<'_>) -> Result<Self> {
        use PublicKeyAlgorithm::*;
        Ok(match algorithm {
            RsaEncryptSign | RsaEncrypt | RsaSign => PublicParams::Rsa {
                n: Mpi::read(r)?,
                e: Mpi::read(r)?,
            },
            Dsa => PublicParams::Dsa {
                p: Mpi::read(r)?,
                q: Mpi::read(r)?,
                g: Mpi::read(r)?,
                y: Mpi::read(r)?,
            },
            ElGamalEncrypt | ElGamalEncryptSign => PublicParams::ElGamal {
                p: Mpi::read(r)?,
                g: Mpi::read(r)?,
                y: Mpi::read(r)?,
            },
            Ecdh => {
                let oid = read_oid(r)?;
                let q = Mpi::read(r)?;
                let kdf_len = r.read_u8()? as usize;
                let kdf = r.take(kdf_len)?.to_vec();
                PublicParams::Ecdh { oid, q, kdf }
            }
            Ecdsa => PublicParams::Ecdsa {
                oid: read_oid(r)?,
                q: Mpi::read(r)?,
            },
            EdDsa => PublicParams::EdDsa {
                oid: read_oid(r)?,
                q: Mpi::read(r)?,
            },
            Unknown(_) => PublicParams::Opaque(r.rest().to_vec()),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            PublicParams::Rsa { n, e } => {
                n.write(out);
                e.write(out);
            }
            PublicParams::Dsa { p, q, g, y } => {
                for mpi in [p, q, g, y] {
                    mpi.write(out);
                }
            }
            PublicParams::ElGamal { p, g, y } => {
                for mpi in [p, g, y] {
                    mpi.write(out);
                }
            }
            PublicParams::Ecdh { oid, q, kdf } => {
                write_oid(out, oid);
                q.write(out);
                out.push(kdf.len() as u8);
                out.extend_from_slice(kdf);
            }
            PublicParams::Ecdsa { oid, q } | PublicParams::EdDsa { oid, q } => {
                write_oid(out, oid);
                q.write(out);
            }
            PublicParams::Opaque(bytes) => out.extend_from_slice(bytes),
        }
    }

    pub fn curve(&self) -> Option<Curve> {
        match self {
            PublicParams::Ecdh { oid, .. }
            | PublicParams::Ecdsa { oid, .. }
            | PublicParams::EdDsa { oid, .. } => Curve::from_oid(oid),
            _ => None,
        }
    }
}

fn read_oid(r: &mut ByteReader<'_>) -> Result<Vec<u8>> {
    let len = r.read_u8()? as usize;
    if len == 0 || len == 0xFF {
        return Err(r.error(format!("invalid curve oid length {len}")));
    }
    Ok(r.take(len)?.to_vec())
}

fn write_oid(out: &mut Vec<u8>, oid: &[u8]) {
    out.push(oid.len() as u8);
    out.extend_from_slice(oid);
}

/// Public portion of a key packet, shared by public and secret packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyMaterial {
    creation_time: u32,
    algorithm: PublicKeyAlgorithm,
    params: PublicParams,
    body: Vec<u8>,
    fingerprint: Fingerprint,
}

impl PublicKeyMaterial {
    pub fn new(creation_time: u32, algorithm: PublicKeyAlgorithm, params: PublicParams) -> Self {
        let mut body = vec![4];
        body.extend_from_slice(&creation_time.to_be_bytes());
        body.push(algorithm.id());
        params.write(&mut body);
        let fingerprint = compute_fingerprint(&body);
        Self {
            creation_time,
            algorithm,
            params,
            body,
            fingerprint,
        }
    }

    pub(crate) fn parse(body: &[u8], offset: usize) -> Result<Self> {
        let mut reader = ByteReader::new(body, offset);
        let key = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(reader.error("trailing data after public key"));
        }
        Ok(key)
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let start = r.pos();
        let version = r.read_u8()?;
        if version != 4 {
            return Err(r.error(format!("unsupported key version {version}")));
        }
        let creation_time = r.read_u32()?;
        let algorithm = PublicKeyAlgorithm::from_id(r.read_u8()?);
        let params = PublicParams::read(algorithm, r)?;

        let body = r.consumed_since(start).to_vec();
        let fingerprint = compute_fingerprint(&body);
        Ok(Self {
            creation_time,
            algorithm,
            params,
            body,
            fingerprint,
        })
    }

    pub fn creation_time(&self) -> u32 {
        self.creation_time
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn params(&self) -> &PublicParams {
        &self.params
    }

    /// Serialized public key body, the input of fingerprint and signature hashing.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }

    pub fn curve(&self) -> Option<Curve> {
        self.params.curve()
    }

    /// Modulus or group size in bits, or the curve strength for curve keys.
    pub fn bit_size(&self) -> Option<u32> {
        match &self.params {
            PublicParams::Rsa { n, .. } => Some(n.bit_len() as u32),
            PublicParams::Dsa { p, .. } | PublicParams::ElGamal { p, .. } => {
                Some(p.bit_len() as u32)
            }
            PublicParams::Ecdh { .. } | PublicParams::Ecdsa { .. } | PublicParams::EdDsa { .. } => {
                self.curve().map(|c| c.bits())
            }
            PublicParams::Opaque(_) => None,
        }
    }
}

fn compute_fingerprint(body: &[u8]) -> Fingerprint {
    let mut hasher = Sha1::new();
    hasher.update([0x99]);
    hasher.update((body.len() as u16).to_be_bytes());
    hasher.update(body);
    Fingerprint(hasher.finalize().into())
}

/// String-to-key specifier (RFC 4880 section 3.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S2k {
    Simple { hash: HashAlgorithm },
    Salted { hash: HashAlgorithm, salt: [u8; 8] },
    Iterated { hash: HashAlgorithm, salt: [u8; 8], count: u8 },
}

impl S2k {
    pub fn hash(&self) -> HashAlgorithm {
        match self {
            S2k::Simple { hash } | S2k::Salted { hash, .. } | S2k::Iterated { hash, .. } => *hash,
        }
    }

    /// Number of octets hashed for an encoded iteration count.
    pub fn decode_count(count: u8) -> usize {
        (16 + (count as usize & 15)) << ((count as usize >> 4) + 6)
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            S2k::Simple { hash } => out.extend_from_slice(&[0, hash.id()]),
            S2k::Salted { hash, salt } => {
                out.extend_from_slice(&[1, hash.id()]);
                out.extend_from_slice(salt);
            }
            S2k::Iterated { hash, salt, count } => {
                out.extend_from_slice(&[3, hash.id()]);
                out.extend_from_slice(salt);
                out.push(*count);
            }
        }
    }
}

const GNU_EXTENSION: u8 = 101;

/// How the secret parameters of a key packet are stored.
#[derive(Debug, Clone)]
pub enum SecretProtection {
    /// Plain MPIs followed by a 2-byte additive checksum
    Unprotected {
        data: Zeroizing<Vec<u8>>,
        checksum: u16,
    },
    /// Encrypted MPIs, usage 254 (SHA-1 check), 255 or a legacy cipher id
    Encrypted {
        usage: u8,
        cipher: SymmetricAlgorithm,
        s2k: S2k,
        iv: Vec<u8>,
        data: Vec<u8>,
    },
    /// GNU extension: secret part stripped
    GnuDummy,
    /// GNU extension: secret part lives on a smartcard
    DivertToCard { serial: Vec<u8> },
}

impl SecretProtection {
    /// Plain secret MPIs with their checksum.
    pub fn unprotected(data: Zeroizing<Vec<u8>>) -> Self {
        let checksum = secret_checksum(&data);
        SecretProtection::Unprotected { data, checksum }
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let usage = r.read_u8()?;
        match usage {
            0 => {
                let rest = r.rest();
                if rest.len() < 2 {
                    return Err(r.error("secret key checksum missing"));
                }
                let (data, sum) = rest.split_at(rest.len() - 2);
                Ok(SecretProtection::Unprotected {
                    data: Zeroizing::new(data.to_vec()),
                    checksum: u16::from_be_bytes([sum[0], sum[1]]),
                })
            }
            254 | 255 => {
                let cipher = SymmetricAlgorithm::from_id(r.read_u8()?);
                let s2k_type = r.read_u8()?;
                let hash = HashAlgorithm::from_id(r.read_u8()?);
                let s2k = match s2k_type {
                    0 => S2k::Simple { hash },
                    1 => S2k::Salted {
                        hash,
                        salt: read_salt(r)?,
                    },
                    3 => S2k::Iterated {
                        hash,
                        salt: read_salt(r)?,
                        count: r.read_u8()?,
                    },
                    GNU_EXTENSION => return Self::read_gnu(r),
                    other => return Err(r.error(format!("unknown S2K specifier {other}"))),
                };
                let iv = read_iv(r, cipher)?;
                Ok(SecretProtection::Encrypted {
                    usage,
                    cipher,
                    s2k,
                    iv,
                    data: r.rest().to_vec(),
                })
            }
            legacy => {
                let cipher = SymmetricAlgorithm::from_id(legacy);
                let iv = read_iv(r, cipher)?;
                Ok(SecretProtection::Encrypted {
                    usage: legacy,
                    cipher,
                    s2k: S2k::Simple {
                        hash: HashAlgorithm::Md5,
                    },
                    iv,
                    data: r.rest().to_vec(),
                })
            }
        }
    }

    fn read_gnu(r: &mut ByteReader<'_>) -> Result<Self> {
        if r.take(3)? != b"GNU" {
            return Err(r.error("invalid GNU S2K extension marker"));
        }
        match r.read_u8()? {
            1 => {
                r.rest();
                Ok(SecretProtection::GnuDummy)
            }
            2 => {
                let len = r.read_u8()? as usize;
                let serial = r.take(len.min(r.remaining()))?.to_vec();
                r.rest();
                Ok(SecretProtection::DivertToCard { serial })
            }
            mode => Err(r.error(format!("unknown GNU S2K mode {mode}"))),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            SecretProtection::Unprotected { data, checksum } => {
                out.push(0);
                out.extend_from_slice(data);
                out.extend_from_slice(&checksum.to_be_bytes());
            }
            SecretProtection::Encrypted {
                usage,
                cipher,
                s2k,
                iv,
                data,
            } => {
                out.push(*usage);
                if matches!(usage, 254 | 255) {
                    out.push(cipher.id());
                    s2k.write(out);
                }
                out.extend_from_slice(iv);
                out.extend_from_slice(data);
            }
            SecretProtection::GnuDummy => {
                out.extend_from_slice(&[0xFF, 0, GNU_EXTENSION, 0]);
                out.extend_from_slice(b"GNU");
                out.push(1);
            }
            SecretProtection::DivertToCard { serial } => {
                out.extend_from_slice(&[0xFF, 0, GNU_EXTENSION, 0]);
                out.extend_from_slice(b"GNU");
                out.push(2);
                out.push(serial.len() as u8);
                out.extend_from_slice(serial);
            }
        }
    }
}

fn read_salt(r: &mut ByteReader<'_>) -> Result<[u8; 8]> {
    let mut salt = [0u8; 8];
    salt.copy_from_slice(r.take(8)?);
    Ok(salt)
}

/// Read the IV of an encrypted secret part. Ciphers with unknown block size
/// get an empty IV and fail later, at unlock time.
fn read_iv(r: &mut ByteReader<'_>, cipher: SymmetricAlgorithm) -> Result<Vec<u8>> {
    match cipher.block_size() {
        Some(len) => Ok(r.take(len)?.to_vec()),
        None => Ok(Vec::new()),
    }
}

/// Sum of all octets modulo 65536.
pub(crate) fn secret_checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, b| acc.wrapping_add(*b as u16))
}

/// Secret key packet body: public part plus stored secret part.
#[derive(Debug, Clone)]
pub struct SecretKeyMaterial {
    public: PublicKeyMaterial,
    protection: SecretProtection,
    secret_raw: Vec<u8>,
}

impl SecretKeyMaterial {
    pub fn new(public: PublicKeyMaterial, protection: SecretProtection) -> Self {
        let mut secret_raw = Vec::new();
        protection.write(&mut secret_raw);
        Self {
            public,
            protection,
            secret_raw,
        }
    }

    pub(crate) fn parse(body: &[u8], offset: usize) -> Result<Self> {
        let mut reader = ByteReader::new(body, offset);
        let public = PublicKeyMaterial::read(&mut reader)?;
        let secret_start = reader.pos();
        let protection = SecretProtection::read(&mut reader)?;
        Ok(Self {
            public,
            protection,
            secret_raw: body[secret_start..].to_vec(),
        })
    }

    pub fn public(&self) -> &PublicKeyMaterial {
        &self.public
    }

    pub fn protection(&self) -> &SecretProtection {
        &self.protection
    }

    /// Whether secret parameters are present (possibly encrypted).
    pub fn is_available(&self) -> bool {
        matches!(
            self.protection,
            SecretProtection::Unprotected { .. } | SecretProtection::Encrypted { .. }
        )
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.protection, SecretProtection::Encrypted { .. })
    }

    /// Same key with the secret part replaced by a GNU dummy marker.
    pub fn stripped(&self) -> Self {
        Self::new(self.public.clone(), SecretProtection::GnuDummy)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.public.body().to_vec();
        out.extend_from_slice(&self.secret_raw);
        out
    }
}

/// Public parameters of a curve key, where `q` is the encoded point.
pub(crate) fn curve_params(
    algorithm: PublicKeyAlgorithm,
    curve: Curve,
    q: &[u8],
    kdf: Option<&[u8]>,
) -> PublicParams {
    let oid = curve.oid().to_vec();
    let q = Mpi::new(q);
    match algorithm {
        PublicKeyAlgorithm::Ecdh => PublicParams::Ecdh {
            oid,
            q,
            kdf: kdf.unwrap_or_default().to_vec(),
        },
        PublicKeyAlgorithm::EdDsa => PublicParams::EdDsa { oid, q },
        _ => PublicParams::Ecdsa { oid, q },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rsa_public() -> PublicKeyMaterial {
        PublicKeyMaterial::new(
            1_500_000_000,
            PublicKeyAlgorithm::RsaEncryptSign,
            PublicParams::Rsa {
                n: Mpi::new(&[0xC5; 128]),
                e: Mpi::new(&[0x01, 0x00, 0x01]),
            },
        )
    }

    #[test]
    fn test_public_key_parse_matches_build() {
        let key = sample_rsa_public();
        let parsed = PublicKeyMaterial::parse(key.body(), 0).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.bit_size(), Some(1024));
        assert_eq!(parsed.key_id(), key.fingerprint().key_id());
    }

    #[test]
    fn test_rejects_v3_key() {
        let mut body = sample_rsa_public().body().to_vec();
        body[0] = 3;
        assert!(PublicKeyMaterial::parse(&body, 0).is_err());
    }

    #[test]
    fn test_s2k_count_decoding() {
        assert_eq!(S2k::decode_count(0x60), 65536);
        assert_eq!(S2k::decode_count(0x00), 1024);
        assert_eq!(S2k::decode_count(0xFF), 65_011_712);
    }

    #[test]
    fn test_gnu_dummy_secret() {
        let secret = SecretKeyMaterial::new(sample_rsa_public(), SecretProtection::GnuDummy);
        let parsed = SecretKeyMaterial::parse(&secret.to_bytes(), 0).unwrap();
        assert!(matches!(parsed.protection(), SecretProtection::GnuDummy));
        assert!(!parsed.is_available());
        assert_eq!(parsed.public(), secret.public());
    }

    #[test]
    fn test_divert_to_card_keeps_serial() {
        let secret = SecretKeyMaterial::new(
            sample_rsa_public(),
            SecretProtection::DivertToCard {
                serial: vec![0xD2, 0x76, 0x00, 0x01],
            },
        );
        let parsed = SecretKeyMaterial::parse(&secret.to_bytes(), 0).unwrap();
        match parsed.protection() {
            SecretProtection::DivertToCard { serial } => {
                assert_eq!(serial, &vec![0xD2, 0x76, 0x00, 0x01])
            }
            other => panic!("unexpected protection {other:?}"),
        }
    }

    #[test]
    fn test_unprotected_checksum() {
        let data = Zeroizing::new(vec![0x00, 0x08, 0xFF]);
        let secret =
            SecretKeyMaterial::new(sample_rsa_public(), SecretProtection::unprotected(data));
        match SecretKeyMaterial::parse(&secret.to_bytes(), 0).unwrap().protection() {
            SecretProtection::Unprotected { checksum, data } => {
                assert_eq!(*checksum, 0x0107);
                assert_eq!(data.as_slice(), &[0x00, 0x08, 0xFF]);
            }
            other => panic!("unexpected protection {other:?}"),
        }
    }
}
