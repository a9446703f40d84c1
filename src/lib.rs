//! # catfile Core Library
//!
//! This crate implements the `.cat` archive container: a linear, delimiter-framed
//! format that serializes filesystem entries (regular files, directories, links,
//! devices and pipes) with independent header and content checksums per entry,
//! and can wrap the whole container in a compression envelope.
//!
//! ## Key Modules
//!
//! - [`record`]: The record codec reading and writing individual archive entries.
//! - [`entry`]: Entry-type classification and hard-link detection.
//! - [`checksum`]: Digest computation over headers and streamed content.
//! - [`envelope`]: Whole-container compression with magic-byte auto-detection.
//! - [`pack`], [`unpack`], [`repack`], [`validate`], [`list`]: The streaming engines.
//! - [`foreign`]: Adapters feeding tar/zip/7z/rar entries into the pack engine.
//!
//! All engines are single-threaded and streaming: content moves in fixed-size
//! chunks, so memory use does not depend on individual file size.

pub mod checksum;
pub mod cli;
pub mod entry;
pub mod envelope;
pub mod error;
pub mod foreign;
pub mod format;
pub mod list;
pub mod pack;
pub mod record;
pub mod repack;
pub mod unpack;
pub mod validate;

pub use checksum::{ChecksumAlgo, ChecksumSet};
pub use entry::EntryKind;
pub use envelope::{Codec, CompressionChoice};
pub use error::ArchiveError;
pub use foreign::{list_foreign, pack_from_foreign, ForeignKind};
pub use format::FormatDescriptor;
pub use list::{list_entries, EntrySummary, ListOptions};
pub use pack::{pack, pack_from_source, PackOptions};
pub use repack::{repack, RepackOptions};
pub use unpack::{unpack, UnpackOptions, UnpackReport};
pub use validate::{validate, ValidateOptions, ValidateReport};
