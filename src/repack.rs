//! # Repack Engine
//!
//! Rewrites an existing container under a different compression selection
//! and/or checksum method without ever touching the original source tree.
//! Entry order, entry types and link topology are preserved exactly; only
//! digest values (when a new method is supplied) and the outer envelope may
//! change. Content streams straight from input to output, spooling through
//! a scratch file only when digests must be recomputed ahead of the
//! checksum fields.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::checksum::{self, ChecksumAlgo, NONE_SENTINEL};
use crate::envelope::{self, Codec, CompressionChoice, EnvelopeWriter};
use crate::error::ArchiveError;
use crate::format::FormatDescriptor;
use crate::record::{self, ContainerReader};

#[derive(Debug, Clone)]
pub struct RepackOptions {
    /// New compression selection for the output container.
    pub compression: CompressionChoice,
    pub level: Option<u32>,
    /// Recompute both digests with this method; `None` keeps the stored
    /// digests (and raw header bytes) untouched.
    pub checksum: Option<ChecksumAlgo>,
    /// Pin the input envelope codec instead of auto-detecting it.
    pub input_codec: Option<Codec>,
    pub descriptor: FormatDescriptor,
    pub verbose: bool,
}

impl Default for RepackOptions {
    fn default() -> Self {
        RepackOptions {
            compression: CompressionChoice::Auto,
            level: None,
            checksum: None,
            input_codec: None,
            descriptor: FormatDescriptor::default(),
            verbose: false,
        }
    }
}

/// Rewrites the container at `input` to `output` under the new options.
pub fn repack(input: &Path, output: &Path, opts: &RepackOptions) -> Result<(), ArchiveError> {
    let file = File::open(input).map_err(|e| ArchiveError::io(e, input))?;
    let reader = envelope::open_reader(file, opts.input_codec)?;
    let mut container = ContainerReader::new(BufReader::new(reader), &opts.descriptor)?;
    let count = container.entry_count();

    // The entry count is known up front here, so records stream directly
    // into the output envelope with no intermediate spool.
    let dir = output.parent().filter(|p| !p.as_os_str().is_empty());
    let tmp = match dir {
        Some(d) => NamedTempFile::new_in(d)?,
        None => NamedTempFile::new_in(".")?,
    };
    let out_file = tmp.reopen().map_err(|e| ArchiveError::io(e, output))?;
    let codec = opts.compression.resolve();
    let mut w = EnvelopeWriter::new(codec, opts.level, Box::new(BufWriter::new(out_file)))?;
    record::write_container_header(&mut w, &opts.descriptor, count)?;

    let delimiter = opts.descriptor.delimiter;
    let mut scratch = tempfile::tempfile()?;

    while let Some(rec) = container.next_record()? {
        if opts.verbose {
            println!("{} {}", rec.header.kind, rec.header.path);
        }
        match opts.checksum {
            None => {
                // Keep mode: raw header bytes and stored digests pass through
                // unchanged so existing checksums stay valid.
                w.write_all(&rec.header_bytes)?;
                w.write_all(rec.header_checksum.as_bytes())?;
                w.write_all(&[delimiter])?;
                w.write_all(rec.content_checksum.as_bytes())?;
                w.write_all(&[delimiter])?;
                if rec.header.kind.has_content() {
                    container.read_content(ChecksumAlgo::None, &mut w)?;
                }
                w.write_all(&[delimiter])?;
            }
            Some(algo) => {
                let header_bytes = rec.header.to_bytes(delimiter);
                let header_checksum = checksum::digest_bytes(algo, &header_bytes);
                let content_checksum = if rec.header.kind.has_content() {
                    scratch.rewind()?;
                    scratch.set_len(0)?;
                    let (digest, _) = container.read_content(algo, &mut scratch)?;
                    digest
                } else {
                    NONE_SENTINEL.to_string()
                };
                w.write_all(&header_bytes)?;
                w.write_all(header_checksum.as_bytes())?;
                w.write_all(&[delimiter])?;
                w.write_all(content_checksum.as_bytes())?;
                w.write_all(&[delimiter])?;
                if rec.header.kind.has_content() {
                    scratch.rewind()?;
                    io::copy(&mut scratch, &mut w)?;
                }
                w.write_all(&[delimiter])?;
            }
        }
    }

    w.finish()?;
    tmp.persist(output)
        .map_err(|e| ArchiveError::io(e.error, output))?;

    if opts.verbose {
        println!("repacked {count} entries into '{}' ({codec})", output.display());
    }
    Ok(())
}
