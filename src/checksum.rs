//! # Checksum Provider
//!
//! Thin dispatch over the digest algorithms a container may use. Header
//! checksums are computed over in-memory header bytes; content checksums are
//! streamed in fixed-size chunks so memory use is independent of file size.
//! The `none` method is a constant no-op returning a fixed sentinel that must
//! not be mistaken for a real digest.

use std::io::{self, Read, Write};
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::ArchiveError;

/// Sentinel digest emitted by [`ChecksumAlgo::None`] and for entry types
/// that carry no content.
pub const NONE_SENTINEL: &str = "0";

/// Chunk size for streamed digest computation and content copies.
pub const CHUNK_SIZE: usize = 4096;

/// The digest algorithm family selectable per container operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgo {
    None,
    Crc32,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for ChecksumAlgo {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ChecksumAlgo::None),
            "crc32" => Ok(ChecksumAlgo::Crc32),
            "md5" => Ok(ChecksumAlgo::Md5),
            "sha1" => Ok(ChecksumAlgo::Sha1),
            "sha224" => Ok(ChecksumAlgo::Sha224),
            "sha256" => Ok(ChecksumAlgo::Sha256),
            "sha384" => Ok(ChecksumAlgo::Sha384),
            "sha512" => Ok(ChecksumAlgo::Sha512),
            other => Err(ArchiveError::UnsupportedCapability(format!(
                "unknown checksum method '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ChecksumAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChecksumAlgo::None => "none",
            ChecksumAlgo::Crc32 => "crc32",
            ChecksumAlgo::Md5 => "md5",
            ChecksumAlgo::Sha1 => "sha1",
            ChecksumAlgo::Sha224 => "sha224",
            ChecksumAlgo::Sha256 => "sha256",
            ChecksumAlgo::Sha384 => "sha384",
            ChecksumAlgo::Sha512 => "sha512",
        };
        write!(f, "{name}")
    }
}

impl ChecksumAlgo {
    /// Infers the algorithm family from a stored digest string by its length.
    /// CRC-32 digests are always emitted zero-padded to 8 characters, so the
    /// mapping is unambiguous for digests this crate produced.
    pub fn infer(digest: &str) -> Option<ChecksumAlgo> {
        match digest.len() {
            1 if digest == NONE_SENTINEL => Some(ChecksumAlgo::None),
            1..=8 => Some(ChecksumAlgo::Crc32),
            32 => Some(ChecksumAlgo::Md5),
            40 => Some(ChecksumAlgo::Sha1),
            56 => Some(ChecksumAlgo::Sha224),
            64 => Some(ChecksumAlgo::Sha256),
            96 => Some(ChecksumAlgo::Sha384),
            128 => Some(ChecksumAlgo::Sha512),
            _ => None,
        }
    }
}

/// The four checksum-method slots threaded through pack and repack calls.
///
/// Only the header and content slots drive per-record digests today; the two
/// aggregate slots are reserved for whole-archive or per-file summary
/// checksums and are accepted and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumSet {
    pub header: ChecksumAlgo,
    pub content: ChecksumAlgo,
    /// Reserved aggregate slots. Accepted without error, not consulted.
    pub aggregate: [ChecksumAlgo; 2],
}

impl ChecksumSet {
    /// Builds a set with the same method in all four slots, matching the
    /// historical call sites that repeated one method four times.
    pub fn uniform(algo: ChecksumAlgo) -> Self {
        ChecksumSet {
            header: algo,
            content: algo,
            aggregate: [algo, algo],
        }
    }
}

impl Default for ChecksumSet {
    fn default() -> Self {
        ChecksumSet::uniform(ChecksumAlgo::Crc32)
    }
}

enum Hasher {
    None,
    Crc32(crc32fast::Hasher),
    Md5(Md5),
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algo: ChecksumAlgo) -> Self {
        match algo {
            ChecksumAlgo::None => Hasher::None,
            ChecksumAlgo::Crc32 => Hasher::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgo::Md5 => Hasher::Md5(Md5::new()),
            ChecksumAlgo::Sha1 => Hasher::Sha1(Sha1::new()),
            ChecksumAlgo::Sha224 => Hasher::Sha224(Sha224::new()),
            ChecksumAlgo::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumAlgo::Sha384 => Hasher::Sha384(Sha384::new()),
            ChecksumAlgo::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::None => {}
            Hasher::Crc32(h) => h.update(bytes),
            Hasher::Md5(h) => h.update(bytes),
            Hasher::Sha1(h) => h.update(bytes),
            Hasher::Sha224(h) => h.update(bytes),
            Hasher::Sha256(h) => h.update(bytes),
            Hasher::Sha384(h) => h.update(bytes),
            Hasher::Sha512(h) => h.update(bytes),
        }
    }

    fn finish(self) -> String {
        match self {
            Hasher::None => NONE_SENTINEL.to_string(),
            Hasher::Crc32(h) => format!("{:08x}", h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha224(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha384(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Computes the digest of an in-memory byte range. Used for record headers,
/// which are already buffered when their checksum is taken.
pub fn digest_bytes(algo: ChecksumAlgo, bytes: &[u8]) -> String {
    let mut h = Hasher::new(algo);
    h.update(bytes);
    h.finish()
}

/// Streams `reader` into `writer` in fixed-size chunks while digesting,
/// returning the digest and the number of bytes moved. Pass [`io::sink`] as
/// the writer to digest without copying.
pub fn copy_and_digest<R: Read + ?Sized, W: Write + ?Sized>(
    algo: ChecksumAlgo,
    reader: &mut R,
    writer: &mut W,
) -> io::Result<(String, u64)> {
    let mut hasher = Hasher::new(algo);
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok((hasher.finish(), total))
}
