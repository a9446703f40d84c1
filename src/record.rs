//! # Record Codec
//!
//! Encodes and decodes individual archive records, plus the container header
//! that precedes them. The wire layout of one record is a run of
//! delimiter-terminated fields:
//!
//! ```text
//! type path link_target size atime mtime mode uid gid hcs ccs [content] term
//! ```
//!
//! Numeric fields are lowercase hexadecimal. The header checksum (`hcs`)
//! covers the nine header fields exactly as serialized, delimiters included.
//! The content checksum (`ccs`) covers the raw content bytes only, so a
//! repack can rewrite the envelope or header without disturbing it. Content
//! is read by its declared length, never delimiter-scanned, because binary
//! content may contain delimiter bytes.

use std::fs::File;
use std::io::{self, BufRead, Read, Seek, Write};

use crate::checksum::{self, ChecksumAlgo, ChecksumSet, NONE_SENTINEL};
use crate::entry::{EntryKind, SourceEntry};
use crate::error::ArchiveError;
use crate::format::FormatDescriptor;

/// The nine header fields of one record, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: EntryKind,
    pub path: String,
    pub link_target: String,
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl RecordHeader {
    /// Serializes the header fields with their trailing delimiters. These are
    /// exactly the bytes the header checksum is computed over.
    pub fn to_bytes(&self, delimiter: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.path.len() + self.link_target.len());
        let mut field = |buf: &mut Vec<u8>, s: &str| {
            buf.extend_from_slice(s.as_bytes());
            buf.push(delimiter);
        };
        field(&mut out, &format!("{:x}", self.kind.code()));
        field(&mut out, &self.path);
        field(&mut out, &self.link_target);
        field(&mut out, &format!("{:x}", self.size));
        field(&mut out, &format!("{:x}", self.atime));
        field(&mut out, &format!("{:x}", self.mtime));
        field(&mut out, &format!("{:x}", self.mode));
        field(&mut out, &format!("{:x}", self.uid));
        field(&mut out, &format!("{:x}", self.gid));
        out
    }
}

/// One fully decoded record header with its stored digests. `header_bytes`
/// preserves the raw serialized header so digests can be re-verified against
/// exactly what was read, not a normalized re-encoding.
#[derive(Debug, Clone)]
pub struct Record {
    pub index: u64,
    pub header: RecordHeader,
    pub header_checksum: String,
    pub content_checksum: String,
    pub header_bytes: Vec<u8>,
}

/// Writes the container signature and entry count: `<magic><d><count><d>`.
pub fn write_container_header<W: Write + ?Sized>(
    w: &mut W,
    desc: &FormatDescriptor,
    entry_count: u64,
) -> io::Result<()> {
    w.write_all(&desc.magic())?;
    w.write_all(&[desc.delimiter])?;
    w.write_all(format!("{entry_count:x}").as_bytes())?;
    w.write_all(&[desc.delimiter])?;
    Ok(())
}

/// Streaming record writer used by the pack engine.
///
/// Content is spooled through a single scratch file while its digest is
/// computed, so the two-checksums-before-content layout never requires a
/// whole file in memory and entry sources stay single-pass.
pub struct RecordEncoder<W: Write> {
    w: W,
    delimiter: u8,
    checksums: ChecksumSet,
    scratch: File,
    count: u64,
}

impl<W: Write> RecordEncoder<W> {
    pub fn new(w: W, desc: &FormatDescriptor, checksums: ChecksumSet) -> io::Result<Self> {
        Ok(RecordEncoder {
            w,
            delimiter: desc.delimiter,
            checksums,
            scratch: tempfile::tempfile()?,
            count: 0,
        })
    }

    /// Number of records written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Encodes one entry: header fields, header checksum, content checksum,
    /// content bytes (regular entries only), terminator.
    pub fn write_entry(&mut self, mut entry: SourceEntry<'_>) -> Result<(), ArchiveError> {
        let index = self.count;
        // Non-regular kinds never carry content; their size is forced to zero
        // rather than trusted.
        let size = if entry.kind.has_content() { entry.size } else { 0 };
        let header = RecordHeader {
            kind: entry.kind,
            path: entry.path.clone(),
            link_target: entry.link_target.clone(),
            size,
            atime: entry.atime,
            mtime: entry.mtime,
            mode: entry.mode,
            uid: entry.uid,
            gid: entry.gid,
        };
        let header_bytes = header.to_bytes(self.delimiter);
        let header_checksum = checksum::digest_bytes(self.checksums.header, &header_bytes);

        let content_checksum = if entry.kind.has_content() {
            let reader = entry.content.as_mut().ok_or_else(|| {
                ArchiveError::format(index, "regular entry supplied without a content reader")
            })?;
            self.scratch.rewind()?;
            self.scratch.set_len(0)?;
            let mut limited = reader.take(size);
            let (digest, copied) =
                checksum::copy_and_digest(self.checksums.content, &mut limited, &mut self.scratch)?;
            if copied != size {
                return Err(ArchiveError::Truncated {
                    index,
                    expected: size - copied,
                });
            }
            digest
        } else {
            NONE_SENTINEL.to_string()
        };

        self.w.write_all(&header_bytes)?;
        self.w.write_all(header_checksum.as_bytes())?;
        self.w.write_all(&[self.delimiter])?;
        self.w.write_all(content_checksum.as_bytes())?;
        self.w.write_all(&[self.delimiter])?;
        if entry.kind.has_content() {
            self.scratch.rewind()?;
            let copied = io::copy(&mut self.scratch, &mut self.w)?;
            debug_assert_eq!(copied, size);
        }
        self.w.write_all(&[self.delimiter])?;
        self.count += 1;
        Ok(())
    }

    /// Flushes and returns the underlying writer together with the record count.
    pub fn finish(mut self) -> io::Result<(W, u64)> {
        self.w.flush()?;
        Ok((self.w, self.count))
    }
}

/// Streaming record reader over a (possibly decompressed) container stream.
///
/// Callers alternate `next_record` with exactly one of `read_content` /
/// `skip_content` per regular record; `next_record` discards any content the
/// caller left unconsumed, which is what the list engine relies on.
#[derive(Debug)]
pub struct ContainerReader<R: BufRead> {
    r: R,
    delimiter: u8,
    entry_count: u64,
    next_index: u64,
    pending_content: u64,
    pending_term: bool,
}

impl<R: BufRead> ContainerReader<R> {
    /// Reads and verifies the container header against the descriptor.
    pub fn new(mut r: R, desc: &FormatDescriptor) -> Result<Self, ArchiveError> {
        let delimiter = desc.delimiter;
        let magic = read_field_raw(&mut r, delimiter, 0)?;
        if magic != desc.magic() {
            return Err(ArchiveError::format(
                0,
                format!(
                    "bad magic: expected '{}', found '{}'",
                    String::from_utf8_lossy(&desc.magic()),
                    String::from_utf8_lossy(&magic)
                ),
            ));
        }
        let count_field = read_field_raw(&mut r, delimiter, 0)?;
        let entry_count = parse_hex_u64(&count_field, 0, "entry count")?;
        Ok(ContainerReader {
            r,
            delimiter,
            entry_count,
            next_index: 0,
            pending_content: 0,
            pending_term: false,
        })
    }

    /// The entry count declared in the container header.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Decodes the next record header, or `None` once the declared count has
    /// been consumed. Reaching end-of-stream earlier is a truncation error.
    pub fn next_record(&mut self) -> Result<Option<Record>, ArchiveError> {
        if self.pending_content > 0 || self.pending_term {
            self.skip_content()?;
        }
        if self.next_index >= self.entry_count {
            return Ok(None);
        }
        let index = self.next_index;

        let mut header_bytes = Vec::new();
        let mut fields: Vec<Vec<u8>> = Vec::with_capacity(9);
        for _ in 0..9 {
            let field = read_field_raw(&mut self.r, self.delimiter, index)?;
            header_bytes.extend_from_slice(&field);
            header_bytes.push(self.delimiter);
            fields.push(field);
        }
        let header_checksum = parse_utf8(read_field_raw(&mut self.r, self.delimiter, index)?, index)?;
        let content_checksum = parse_utf8(read_field_raw(&mut self.r, self.delimiter, index)?, index)?;

        let code = parse_hex_u64(&fields[0], index, "entry type")? as u32;
        let kind = EntryKind::from_code(code)
            .ok_or_else(|| ArchiveError::format(index, format!("unknown entry type code {code}")))?;
        let header = RecordHeader {
            kind,
            path: parse_utf8(fields[1].clone(), index)?,
            link_target: parse_utf8(fields[2].clone(), index)?,
            size: parse_hex_u64(&fields[3], index, "size")?,
            atime: parse_hex_u64(&fields[4], index, "atime")?,
            mtime: parse_hex_u64(&fields[5], index, "mtime")?,
            mode: parse_hex_u64(&fields[6], index, "mode")? as u32,
            uid: parse_hex_u64(&fields[7], index, "uid")? as u32,
            gid: parse_hex_u64(&fields[8], index, "gid")? as u32,
        };
        if !kind.has_content() && header.size != 0 {
            return Err(ArchiveError::format(
                index,
                format!("non-regular entry '{}' declares nonzero size {}", header.path, header.size),
            ));
        }

        self.pending_content = header.size;
        self.pending_term = true;
        self.next_index = index + 1;
        Ok(Some(Record {
            index,
            header,
            header_checksum,
            content_checksum,
            header_bytes,
        }))
    }

    /// Streams the current record's content into `w` while digesting it with
    /// `algo`, then consumes the record terminator. Returns the digest and
    /// the content length.
    pub fn read_content<W: Write + ?Sized>(
        &mut self,
        algo: ChecksumAlgo,
        w: &mut W,
    ) -> Result<(String, u64), ArchiveError> {
        let size = self.pending_content;
        let index = self.next_index.saturating_sub(1);
        let mut limited = (&mut self.r).take(size);
        let (digest, copied) = checksum::copy_and_digest(algo, &mut limited, w)?;
        if copied != size {
            return Err(ArchiveError::Truncated {
                index,
                expected: size - copied,
            });
        }
        self.pending_content = 0;
        self.consume_terminator(index)?;
        Ok((digest, copied))
    }

    /// Discards the current record's content with a bounded copy; never
    /// materializes it in memory.
    pub fn skip_content(&mut self) -> Result<(), ArchiveError> {
        self.read_content(ChecksumAlgo::None, &mut io::sink())?;
        Ok(())
    }

    /// True when the stream ends exactly after the last record, i.e. no
    /// trailing garbage follows the declared entry count.
    pub fn at_clean_eof(&mut self) -> Result<bool, ArchiveError> {
        if self.pending_content > 0 || self.pending_term {
            self.skip_content()?;
        }
        let mut byte = [0u8; 1];
        match self.r.read(&mut byte)? {
            0 => Ok(true),
            _ => Ok(false),
        }
    }

    fn consume_terminator(&mut self, index: u64) -> Result<(), ArchiveError> {
        if !self.pending_term {
            return Ok(());
        }
        let mut byte = [0u8; 1];
        if self.r.read(&mut byte)? == 0 {
            return Err(ArchiveError::Truncated { index, expected: 1 });
        }
        if byte[0] != self.delimiter {
            return Err(ArchiveError::format(
                index,
                format!("record terminator mismatch: expected {:#04x}, found {:#04x}", self.delimiter, byte[0]),
            ));
        }
        self.pending_term = false;
        Ok(())
    }
}

fn read_field_raw<R: BufRead>(r: &mut R, delimiter: u8, index: u64) -> Result<Vec<u8>, ArchiveError> {
    let mut buf = Vec::new();
    let n = r.read_until(delimiter, &mut buf)?;
    if n == 0 {
        return Err(ArchiveError::Truncated { index, expected: 1 });
    }
    match buf.last() {
        Some(&b) if b == delimiter => {
            buf.pop();
            Ok(buf)
        }
        // Stream ended mid-field.
        _ => Err(ArchiveError::Truncated { index, expected: 1 }),
    }
}

fn parse_utf8(bytes: Vec<u8>, index: u64) -> Result<String, ArchiveError> {
    String::from_utf8(bytes)
        .map_err(|_| ArchiveError::format(index, "field is not valid UTF-8"))
}

fn parse_hex_u64(bytes: &[u8], index: u64, what: &str) -> Result<u64, ArchiveError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| ArchiveError::format(index, format!("{what} field is not valid UTF-8")))?;
    u64::from_str_radix(s, 16)
        .map_err(|_| ArchiveError::format(index, format!("{what} field '{s}' is not hexadecimal")))
}
