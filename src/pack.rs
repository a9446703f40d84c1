//! # Pack Engine
//!
//! Walks a set of input paths (or any other entry source), classifies each
//! entry, computes checksums and emits records, then optionally wraps the
//! finished container in a compression envelope. Records are spooled to a
//! temporary file while they are counted, because the container header
//! declares the entry count up front; the final container is then written to
//! a temporary path in the destination directory and renamed into place, so
//! a partially written file never sits at the canonical output path.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::checksum::ChecksumSet;
use crate::entry::{EntryKind, EntrySource, InodeMap, SourceEntry};
use crate::envelope::{CompressionChoice, EnvelopeWriter};
use crate::error::ArchiveError;
use crate::format::FormatDescriptor;
use crate::record::{self, RecordEncoder};

/// Options shared by pack and repack-style container writes.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Compression selection: auto, an explicit codec, or the pass-through.
    pub compression: CompressionChoice,
    /// Codec-specific compression level; `None` uses each codec's default.
    pub level: Option<u32>,
    /// The four checksum-method slots (header, content, two reserved).
    pub checksums: ChecksumSet,
    /// Container variant being produced.
    pub descriptor: FormatDescriptor,
    pub verbose: bool,
    /// Skip-and-continue semantics for entries that vanish or cannot be read
    /// during the walk. With this off (the default) any entry failure aborts
    /// the whole pack; no partial container is ever considered valid.
    pub skip_errors: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        PackOptions {
            compression: CompressionChoice::Auto,
            level: None,
            checksums: ChecksumSet::default(),
            descriptor: FormatDescriptor::default(),
            verbose: false,
            skip_errors: false,
        }
    }
}

/// Packs local filesystem paths into a container at `output`.
pub fn pack(inputs: &[PathBuf], output: &Path, opts: &PackOptions) -> Result<(), ArchiveError> {
    let mut source = FsSource::new(inputs.to_vec(), opts.skip_errors, opts.verbose);
    pack_from_source(&mut source, output, opts)
}

/// Packs entries from any [`EntrySource`] into a container at `output`.
/// Foreign-format adapters plug in here in place of the filesystem walk.
pub fn pack_from_source(
    source: &mut dyn EntrySource,
    output: &Path,
    opts: &PackOptions,
) -> Result<(), ArchiveError> {
    // Pass 1: spool records while counting entries.
    let spool = tempfile::tempfile()?;
    let mut encoder = RecordEncoder::new(
        BufWriter::new(spool),
        &opts.descriptor,
        opts.checksums,
    )?;
    source.for_each(&mut |entry| {
        if opts.verbose {
            println!("{}", entry.path);
        }
        encoder.write_entry(entry)
    })?;
    let (spool, count) = encoder.finish()?;
    let mut spool = spool
        .into_inner()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    spool.rewind()?;
    tracing::debug!(count, "record spool complete");

    // Pass 2: stream header + spool through the envelope into a temp file
    // next to the output, renamed into place only on success.
    let codec = opts.compression.resolve();
    let dir = output.parent().filter(|p| !p.as_os_str().is_empty());
    let tmp = match dir {
        Some(d) => NamedTempFile::new_in(d)?,
        None => NamedTempFile::new_in(".")?,
    };
    let out_file = tmp
        .reopen()
        .map_err(|e| ArchiveError::io(e, output))?;
    let mut writer = EnvelopeWriter::new(
        codec,
        opts.level,
        Box::new(BufWriter::new(out_file)),
    )?;
    record::write_container_header(&mut writer, &opts.descriptor, count)?;
    io::copy(&mut spool, &mut writer)?;
    writer.finish()?;
    tmp.persist(output)
        .map_err(|e| ArchiveError::io(e.error, output))?;

    if opts.verbose {
        println!("packed {count} entries into '{}' ({codec})", output.display());
    }
    Ok(())
}

/// The local filesystem entry source: a deterministic recursive walk with
/// inode-based hard-link detection.
pub struct FsSource {
    inputs: Vec<PathBuf>,
    skip_errors: bool,
    verbose: bool,
}

impl FsSource {
    pub fn new(inputs: Vec<PathBuf>, skip_errors: bool, verbose: bool) -> Self {
        FsSource {
            inputs,
            skip_errors,
            verbose,
        }
    }

    /// Archive path for `path` relative to the walk base: inputs keep their
    /// final component, so packing `a/b/tree` stores `tree/...`. `.`
    /// components are dropped, so a `.` input stores `sub/file`, not
    /// `./sub/file`; the walk root itself normalizes to an empty string and
    /// the caller skips that record.
    fn relative_path(base: &Path, path: &Path) -> Result<String, ArchiveError> {
        let rel = path
            .strip_prefix(base)
            .map_err(|_| ArchiveError::StripPrefix {
                prefix: base.to_path_buf(),
                path: path.to_path_buf(),
            })?;
        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Ok(parts.join("/"))
    }
}

impl EntrySource for FsSource {
    fn for_each(
        &mut self,
        f: &mut dyn FnMut(SourceEntry<'_>) -> Result<(), ArchiveError>,
    ) -> Result<(), ArchiveError> {
        // One inode map per pack invocation; never persisted.
        let mut inodes = InodeMap::new();

        for input in &self.inputs {
            let base = input.parent().unwrap_or(Path::new("")).to_path_buf();
            // Sorted traversal keeps one run reproducible against validate.
            let walker = WalkDir::new(input).follow_links(false).sort_by_file_name();
            for dirent in walker {
                let dirent = match dirent {
                    Ok(d) => d,
                    Err(e) if self.skip_errors => {
                        tracing::warn!(error = %e, "skipping unreadable entry");
                        continue;
                    }
                    Err(e) => {
                        let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                        return Err(ArchiveError::io(e.into(), path));
                    }
                };
                let path = dirent.path().to_path_buf();
                let meta = match fs::symlink_metadata(&path) {
                    Ok(m) => m,
                    // The path vanished between enumeration and stat.
                    Err(e) if self.skip_errors => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping vanished entry");
                        continue;
                    }
                    Err(e) => return Err(ArchiveError::io(e, path)),
                };

                let archive_path = Self::relative_path(&base, &path)?;
                // Walking `.` yields the root as an unnameable empty path;
                // its children stand on their own.
                if archive_path.is_empty() {
                    continue;
                }
                let mode = meta.mode();
                let mut kind = EntryKind::from_mode(mode);
                let mut link_target = String::new();
                match kind {
                    EntryKind::Regular => {
                        // Only regular files consult the inode map.
                        let (k, target) = inodes.classify_regular(meta.ino(), &archive_path);
                        kind = k;
                        link_target = target;
                    }
                    EntryKind::Symlink => {
                        let target = fs::read_link(&path)
                            .map_err(|e| ArchiveError::io(e, path.clone()))?;
                        link_target = target.to_string_lossy().into_owned();
                    }
                    _ => {}
                }

                let size = if kind.has_content() { meta.len() } else { 0 };
                let atime = meta.atime().max(0) as u64;
                let mtime = meta.mtime().max(0) as u64;

                let mut content_file = if kind.has_content() {
                    match File::open(&path) {
                        Ok(file) => Some(file),
                        Err(e) if self.skip_errors => {
                            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                            continue;
                        }
                        Err(e) => return Err(ArchiveError::io(e, path)),
                    }
                } else {
                    None
                };

                if self.verbose {
                    tracing::debug!(path = %archive_path, %kind, size, "classified entry");
                }

                f(SourceEntry {
                    kind,
                    path: archive_path,
                    link_target,
                    size,
                    atime,
                    mtime,
                    mode,
                    uid: meta.uid(),
                    gid: meta.gid(),
                    content: content_file
                        .as_mut()
                        .map(|file| file as &mut dyn Read),
                })?;
            }
        }
        Ok(())
    }
}
