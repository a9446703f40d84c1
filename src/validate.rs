//! # Validate Engine
//!
//! Scans every record, recomputes header and content digests and compares
//! them to the stored values. The checksum method is inferred per record from
//! the stored digest unless the caller pins one. The container is valid only
//! if all entries pass, the declared entry count is fully consumed and the
//! stream ends with no trailing garbage. Never mutates the container.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::checksum::{self, ChecksumAlgo, NONE_SENTINEL};
use crate::entry::EntryKind;
use crate::envelope::{self, Codec};
use crate::error::ArchiveError;
use crate::format::FormatDescriptor;
use crate::record::ContainerReader;

/// Per-entry validation outcome.
#[derive(Debug, Clone)]
pub struct EntryCheck {
    pub index: u64,
    pub kind: EntryKind,
    pub path: String,
    pub header_ok: bool,
    pub content_ok: bool,
}

impl EntryCheck {
    pub fn passed(&self) -> bool {
        self.header_ok && self.content_ok
    }
}

/// Aggregate validation result: per-entry pass/fail plus the overall verdict.
#[derive(Debug)]
pub struct ValidateReport {
    pub entries: Vec<EntryCheck>,
    /// True iff every entry passed, the declared count was consumed and the
    /// stream terminated cleanly.
    pub valid: bool,
}

/// Options steering a validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Pin the envelope codec instead of auto-detecting it.
    pub codec: Option<Codec>,
    /// Recompute digests with this method instead of inferring one per record.
    pub method: Option<ChecksumAlgo>,
    pub descriptor: FormatDescriptor,
    pub verbose: bool,
}

/// Validates the container at `input` and reports per-entry results.
pub fn validate(input: &Path, opts: &ValidateOptions) -> Result<ValidateReport, ArchiveError> {
    let file = File::open(input).map_err(|e| ArchiveError::io(e, input))?;
    let reader = envelope::open_reader(file, opts.codec)?;
    let mut container = ContainerReader::new(BufReader::new(reader), &opts.descriptor)?;

    let mut entries = Vec::new();
    let mut all_passed = true;

    while let Some(rec) = container.next_record()? {
        let header_algo = opts
            .method
            .or_else(|| ChecksumAlgo::infer(&rec.header_checksum))
            .unwrap_or(ChecksumAlgo::None);
        let header_ok = if header_algo == ChecksumAlgo::None {
            rec.header_checksum == NONE_SENTINEL
        } else {
            checksum::digest_bytes(header_algo, &rec.header_bytes) == rec.header_checksum
        };

        let content_ok = if rec.header.kind.has_content() {
            let content_algo = opts
                .method
                .or_else(|| ChecksumAlgo::infer(&rec.content_checksum))
                .unwrap_or(ChecksumAlgo::None);
            let (digest, _) = container.read_content(content_algo, &mut io::sink())?;
            if content_algo == ChecksumAlgo::None {
                rec.content_checksum == NONE_SENTINEL
            } else {
                digest == rec.content_checksum
            }
        } else {
            // Entries without content must carry the sentinel.
            rec.content_checksum == NONE_SENTINEL
        };

        if opts.verbose {
            let verdict = if header_ok && content_ok { "ok" } else { "FAILED" };
            println!("{verdict:>6}  {} {}", rec.header.kind, rec.header.path);
        }
        all_passed &= header_ok && content_ok;
        entries.push(EntryCheck {
            index: rec.index,
            kind: rec.header.kind,
            path: rec.header.path.clone(),
            header_ok,
            content_ok,
        });
    }

    let clean_end = container.at_clean_eof()?;
    if !clean_end {
        tracing::warn!("trailing bytes found after the last declared record");
    }

    Ok(ValidateReport {
        entries,
        valid: all_passed && clean_end,
    })
}
