//! # Compression Envelope
//!
//! Wraps or unwraps an entire container byte stream with a selected codec,
//! or passes it through uncompressed. On read, "auto" never assumes a codec:
//! it is inferred from the stream's leading magic bytes. Brotli frames carry
//! no magic bytes, so a brotli container can only be opened with its codec
//! pinned explicitly.

use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::str::FromStr;

use crate::error::ArchiveError;

/// Number of leading bytes that suffice to identify every detectable codec.
const MAGIC_PROBE_LEN: usize = 6;

/// A whole-container compression codec. `Store` is the uncompressed pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Store,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
    Brotli,
    Lz4,
}

impl FromStr for Codec {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "store" => Ok(Codec::Store),
            "gzip" | "gz" => Ok(Codec::Gzip),
            "bzip2" | "bz2" => Ok(Codec::Bzip2),
            "lzma" | "xz" => Ok(Codec::Xz),
            "zstd" | "zstandard" => Ok(Codec::Zstd),
            "brotli" | "br" => Ok(Codec::Brotli),
            "lz4" => Ok(Codec::Lz4),
            other => Err(ArchiveError::UnsupportedCapability(format!(
                "unknown compression codec '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Codec::Store => "none",
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
            Codec::Xz => "xz",
            Codec::Zstd => "zstd",
            Codec::Brotli => "brotli",
            Codec::Lz4 => "lz4",
        };
        write!(f, "{name}")
    }
}

impl Codec {
    /// Identifies a codec from the stream's leading bytes, or `None` when no
    /// known envelope magic matches (an uncompressed container, or brotli).
    pub fn detect(prefix: &[u8]) -> Option<Codec> {
        match prefix {
            p if p.starts_with(&[0x1f, 0x8b]) => Some(Codec::Gzip),
            p if p.starts_with(b"BZh") => Some(Codec::Bzip2),
            p if p.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) => Some(Codec::Xz),
            p if p.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) => Some(Codec::Zstd),
            p if p.starts_with(&[0x04, 0x22, 0x4d, 0x18]) => Some(Codec::Lz4),
            _ => None,
        }
    }
}

/// The caller's compression selection: auto-pick, or a concrete codec
/// (including the `none` pass-through).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionChoice {
    Auto,
    Codec(Codec),
}

impl CompressionChoice {
    /// Resolves `Auto` to the default write-side codec.
    pub fn resolve(self) -> Codec {
        match self {
            CompressionChoice::Auto => Codec::Zstd,
            CompressionChoice::Codec(c) => c,
        }
    }
}

impl FromStr for CompressionChoice {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(CompressionChoice::Auto)
        } else {
            Ok(CompressionChoice::Codec(s.parse()?))
        }
    }
}

/// A container output stream running through the selected codec. `finish`
/// must be called to flush codec trailers before the file is persisted.
pub enum EnvelopeWriter {
    Store(Box<dyn Write>),
    Gzip(flate2::write::GzEncoder<Box<dyn Write>>),
    Bzip2(bzip2::write::BzEncoder<Box<dyn Write>>),
    Xz(xz2::write::XzEncoder<Box<dyn Write>>),
    Zstd(zstd::stream::Encoder<'static, Box<dyn Write>>),
    Brotli(brotli::CompressorWriter<Box<dyn Write>>),
    Lz4(lz4_flex::frame::FrameEncoder<Box<dyn Write>>),
}

impl EnvelopeWriter {
    /// Wraps `out` with `codec` at the given level. Levels are clamped to
    /// each codec's own range; `None` picks the codec's default.
    pub fn new(codec: Codec, level: Option<u32>, out: Box<dyn Write>) -> Result<Self, ArchiveError> {
        let w = match codec {
            Codec::Store => EnvelopeWriter::Store(out),
            Codec::Gzip => {
                let level = level.unwrap_or(6).min(9);
                EnvelopeWriter::Gzip(flate2::write::GzEncoder::new(
                    out,
                    flate2::Compression::new(level),
                ))
            }
            Codec::Bzip2 => {
                let level = level.unwrap_or(9).clamp(1, 9);
                EnvelopeWriter::Bzip2(bzip2::write::BzEncoder::new(
                    out,
                    bzip2::Compression::new(level),
                ))
            }
            Codec::Xz => {
                let level = level.unwrap_or(6).min(9);
                EnvelopeWriter::Xz(xz2::write::XzEncoder::new(out, level))
            }
            Codec::Zstd => {
                let level = level.unwrap_or(3).min(22) as i32;
                EnvelopeWriter::Zstd(zstd::stream::Encoder::new(out, level)?)
            }
            Codec::Brotli => {
                let level = level.unwrap_or(11).min(11);
                EnvelopeWriter::Brotli(brotli::CompressorWriter::new(out, 4096, level, 22))
            }
            Codec::Lz4 => EnvelopeWriter::Lz4(lz4_flex::frame::FrameEncoder::new(out)),
        };
        Ok(w)
    }

    /// Finishes the codec frame and flushes the inner writer.
    pub fn finish(self) -> io::Result<()> {
        match self {
            EnvelopeWriter::Store(mut w) => w.flush(),
            EnvelopeWriter::Gzip(enc) => {
                let mut inner = enc.finish()?;
                inner.flush()
            }
            EnvelopeWriter::Bzip2(enc) => {
                let mut inner = enc.finish()?;
                inner.flush()
            }
            EnvelopeWriter::Xz(enc) => {
                let mut inner = enc.finish()?;
                inner.flush()
            }
            EnvelopeWriter::Zstd(enc) => {
                let mut inner = enc.finish()?;
                inner.flush()
            }
            EnvelopeWriter::Brotli(mut enc) => {
                enc.flush()?;
                let mut inner = enc.into_inner();
                inner.flush()
            }
            EnvelopeWriter::Lz4(enc) => {
                let mut inner = enc
                    .finish()
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                inner.flush()
            }
        }
    }
}

impl Write for EnvelopeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EnvelopeWriter::Store(w) => w.write(buf),
            EnvelopeWriter::Gzip(w) => w.write(buf),
            EnvelopeWriter::Bzip2(w) => w.write(buf),
            EnvelopeWriter::Xz(w) => w.write(buf),
            EnvelopeWriter::Zstd(w) => w.write(buf),
            EnvelopeWriter::Brotli(w) => w.write(buf),
            EnvelopeWriter::Lz4(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EnvelopeWriter::Store(w) => w.flush(),
            EnvelopeWriter::Gzip(w) => w.flush(),
            EnvelopeWriter::Bzip2(w) => w.flush(),
            EnvelopeWriter::Xz(w) => w.flush(),
            EnvelopeWriter::Zstd(w) => w.flush(),
            EnvelopeWriter::Brotli(w) => w.flush(),
            EnvelopeWriter::Lz4(w) => w.flush(),
        }
    }
}

/// Opens a container file for reading, stripping the compression envelope.
///
/// With `pinned` set the codec is used as given; otherwise it is inferred
/// from the file's leading magic bytes, falling back to the uncompressed
/// pass-through when nothing matches.
pub fn open_reader(mut file: File, pinned: Option<Codec>) -> Result<Box<dyn Read>, ArchiveError> {
    let codec = match pinned {
        Some(c) => c,
        None => {
            let mut probe = [0u8; MAGIC_PROBE_LEN];
            let mut filled = 0;
            while filled < MAGIC_PROBE_LEN {
                let n = file.read(&mut probe[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            file.rewind()?;
            Codec::detect(&probe[..filled]).unwrap_or(Codec::Store)
        }
    };
    tracing::debug!(?codec, "opening container envelope");
    let reader: Box<dyn Read> = match codec {
        Codec::Store => Box::new(file),
        Codec::Gzip => Box::new(flate2::read::MultiGzDecoder::new(file)),
        Codec::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
        Codec::Xz => Box::new(xz2::read::XzDecoder::new(file)),
        Codec::Zstd => Box::new(zstd::stream::Decoder::new(file)?),
        Codec::Brotli => Box::new(brotli::Decompressor::new(file, 4096)),
        Codec::Lz4 => Box::new(lz4_flex::frame::FrameDecoder::new(file)),
    };
    Ok(reader)
}
