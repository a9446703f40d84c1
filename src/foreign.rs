//! # Foreign-Format Adapters
//!
//! Readers that pull entries out of tar, zip, 7z and rar containers and feed
//! them into the pack engine through the same [`EntrySource`] capability the
//! local filesystem walk implements. Hard-link detection here is
//! adapter-reported (tar's own link records), not inode-derived, because
//! foreign containers carry no inode numbers. Formats whose reader library
//! is not compiled in fail fast with an `UnsupportedCapability` error before
//! any output is produced.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::entry::{EntryKind, EntrySource, SourceEntry};
use crate::error::ArchiveError;
use crate::list::EntrySummary;
use crate::pack::{pack_from_source, PackOptions};

/// The foreign container kinds a conversion can start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKind {
    Tar,
    Zip,
    SevenZip,
    Rar,
}

impl FromStr for ForeignKind {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tar" => Ok(ForeignKind::Tar),
            "zip" => Ok(ForeignKind::Zip),
            "7z" | "7zip" | "sevenzip" => Ok(ForeignKind::SevenZip),
            "rar" => Ok(ForeignKind::Rar),
            other => Err(ArchiveError::UnsupportedCapability(format!(
                "unknown foreign container format '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ForeignKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ForeignKind::Tar => "tar",
            ForeignKind::Zip => "zip",
            ForeignKind::SevenZip => "7z",
            ForeignKind::Rar => "rar",
        };
        f.pad(name)
    }
}

/// Opens an entry source over a foreign container, or fails fast when the
/// required reader is not available in this build.
pub fn open_source(kind: ForeignKind, input: &Path) -> Result<Box<dyn EntrySource>, ArchiveError> {
    match kind {
        ForeignKind::Tar => Ok(Box::new(TarSource::new(input))),
        ForeignKind::Zip => Ok(Box::new(ZipSource::new(input))),
        ForeignKind::SevenZip => {
            #[cfg(feature = "sevenz")]
            {
                Ok(Box::new(sevenz::SevenZipSource::new(input)))
            }
            #[cfg(not(feature = "sevenz"))]
            {
                Err(ArchiveError::UnsupportedCapability(
                    "7z support is not compiled in (build with the 'sevenz' feature)".to_string(),
                ))
            }
        }
        ForeignKind::Rar => {
            #[cfg(feature = "rar")]
            {
                Ok(Box::new(rar::RarSource::new(input)))
            }
            #[cfg(not(feature = "rar"))]
            {
                Err(ArchiveError::UnsupportedCapability(
                    "rar support is not compiled in (build with the 'rar' feature)".to_string(),
                ))
            }
        }
    }
}

/// Converts a foreign container into a native one by substituting the
/// adapter's entry stream for the filesystem walk.
pub fn pack_from_foreign(
    kind: ForeignKind,
    input: &Path,
    output: &Path,
    opts: &PackOptions,
) -> Result<(), ArchiveError> {
    let mut source = open_source(kind, input)?;
    pack_from_source(source.as_mut(), output, opts)
}

/// Lists the entries of a foreign container without converting it.
pub fn list_foreign(
    kind: ForeignKind,
    input: &Path,
    verbose: bool,
) -> Result<Vec<EntrySummary>, ArchiveError> {
    let mut source = open_source(kind, input)?;
    let mut summaries = Vec::new();
    let mut index = 0u64;
    source.for_each(&mut |entry| {
        if verbose {
            println!("{:>8}  {:>10}  {}", entry.kind, entry.size, entry.path);
        }
        summaries.push(EntrySummary {
            index,
            kind: entry.kind,
            path: entry.path.clone(),
            link_target: entry.link_target.clone(),
            size: entry.size,
        });
        index += 1;
        Ok(())
    })?;
    Ok(summaries)
}

/// Synthesizes full `st_mode` bits for foreign entries that only carry
/// permission bits (or none at all).
fn full_mode(kind: EntryKind, perm: u32) -> u32 {
    let ifmt = match kind {
        EntryKind::Regular | EntryKind::HardLink => libc::S_IFREG,
        EntryKind::Symlink => libc::S_IFLNK,
        EntryKind::CharDevice => libc::S_IFCHR,
        EntryKind::BlockDevice => libc::S_IFBLK,
        EntryKind::Directory => libc::S_IFDIR,
        EntryKind::Fifo => libc::S_IFIFO,
    };
    (ifmt as u32) | (perm & 0o7777)
}

fn foreign_err(
    format: &'static str,
    e: impl std::error::Error + Send + Sync + 'static,
) -> ArchiveError {
    ArchiveError::Foreign {
        format,
        source: Box::new(e),
    }
}

/// Adapter over `tar` archives. Hard links come straight from tar's own
/// link records.
pub struct TarSource {
    path: PathBuf,
}

impl TarSource {
    pub fn new(path: &Path) -> Self {
        TarSource {
            path: path.to_path_buf(),
        }
    }
}

impl EntrySource for TarSource {
    fn for_each(
        &mut self,
        f: &mut dyn FnMut(SourceEntry<'_>) -> Result<(), ArchiveError>,
    ) -> Result<(), ArchiveError> {
        let file = File::open(&self.path).map_err(|e| ArchiveError::io(e, self.path.clone()))?;
        let mut archive = tar::Archive::new(BufReader::new(file));
        let entries = archive.entries().map_err(|e| foreign_err("tar", e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| foreign_err("tar", e))?;
            let header = entry.header();
            use tar::EntryType;
            let kind = match header.entry_type() {
                EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                    EntryKind::Regular
                }
                EntryType::Link => EntryKind::HardLink,
                EntryType::Symlink => EntryKind::Symlink,
                EntryType::Char => EntryKind::CharDevice,
                EntryType::Block => EntryKind::BlockDevice,
                EntryType::Directory => EntryKind::Directory,
                EntryType::Fifo => EntryKind::Fifo,
                // Metadata pseudo-entries carry no filesystem object.
                _ => continue,
            };
            let path = entry
                .path()
                .map_err(|e| foreign_err("tar", e))?
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string();
            let link_target = entry
                .link_name()
                .map_err(|e| foreign_err("tar", e))?
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let size = if kind.has_content() { entry.size() } else { 0 };
            let perm = header.mode().unwrap_or(0o644);
            let uid = header.uid().unwrap_or(0) as u32;
            let gid = header.gid().unwrap_or(0) as u32;
            let mtime = header.mtime().unwrap_or(0);

            f(SourceEntry {
                kind,
                path,
                link_target,
                size,
                atime: mtime,
                mtime,
                mode: full_mode(kind, perm),
                uid,
                gid,
                content: kind
                    .has_content()
                    .then_some(&mut entry as &mut dyn Read),
            })?;
        }
        Ok(())
    }
}

/// Adapter over `zip` archives. Symlinks are recognized through the entry's
/// unix mode bits; the link target is the entry's content.
pub struct ZipSource {
    path: PathBuf,
}

impl ZipSource {
    pub fn new(path: &Path) -> Self {
        ZipSource {
            path: path.to_path_buf(),
        }
    }
}

impl EntrySource for ZipSource {
    fn for_each(
        &mut self,
        f: &mut dyn FnMut(SourceEntry<'_>) -> Result<(), ArchiveError>,
    ) -> Result<(), ArchiveError> {
        let file = File::open(&self.path).map_err(|e| ArchiveError::io(e, self.path.clone()))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| foreign_err("zip", e))?;
        for i in 0..archive.len() {
            let mut zf = archive.by_index(i).map_err(|e| foreign_err("zip", e))?;
            let raw_name = zf.name().to_string();
            let path = raw_name.trim_end_matches('/').to_string();
            let mode = zf.unix_mode();
            // MS-DOS timestamps predating the unix epoch collapse to zero.
            let mtime = zf
                .last_modified()
                .to_time()
                .map(|t| t.unix_timestamp().max(0) as u64)
                .unwrap_or(0);

            let kind = if zf.is_dir() {
                EntryKind::Directory
            } else {
                match mode.map(EntryKind::from_mode) {
                    Some(EntryKind::Symlink) => EntryKind::Symlink,
                    _ => EntryKind::Regular,
                }
            };

            let perm = mode.map(|m| m & 0o7777).unwrap_or(match kind {
                EntryKind::Directory => 0o755,
                _ => 0o644,
            });

            if kind == EntryKind::Symlink {
                let mut target = String::new();
                zf.read_to_string(&mut target)
                    .map_err(|e| ArchiveError::io(e, self.path.clone()))?;
                f(SourceEntry {
                    kind,
                    path,
                    link_target: target,
                    size: 0,
                    atime: mtime,
                    mtime,
                    mode: full_mode(kind, perm),
                    uid: 0,
                    gid: 0,
                    content: None,
                })?;
                continue;
            }

            let size = if kind.has_content() { zf.size() } else { 0 };
            f(SourceEntry {
                kind,
                path,
                link_target: String::new(),
                size,
                atime: mtime,
                mtime,
                mode: full_mode(kind, perm),
                uid: 0,
                gid: 0,
                content: kind.has_content().then_some(&mut zf as &mut dyn Read),
            })?;
        }
        Ok(())
    }
}

#[cfg(feature = "sevenz")]
mod sevenz {
    use super::*;

    /// Adapter over 7z archives. Solid compression forces sequential entry
    /// extraction, which matches the pack engine's single-pass consumption.
    pub struct SevenZipSource {
        path: PathBuf,
    }

    impl SevenZipSource {
        pub fn new(path: &Path) -> Self {
            SevenZipSource {
                path: path.to_path_buf(),
            }
        }
    }

    impl EntrySource for SevenZipSource {
        fn for_each(
            &mut self,
            f: &mut dyn FnMut(SourceEntry<'_>) -> Result<(), ArchiveError>,
        ) -> Result<(), ArchiveError> {
            let mut sz = sevenz_rust::SevenZReader::open(&self.path, sevenz_rust::Password::empty())
                .map_err(|e| foreign_err("7z", e))?;
            // The callback API cannot return our error type directly; the
            // first failure is stashed and iteration stops.
            let mut failure: Option<ArchiveError> = None;
            sz.for_each_entries(|entry, reader| {
                let kind = if entry.is_directory() {
                    EntryKind::Directory
                } else {
                    EntryKind::Regular
                };
                let size = if kind.has_content() { entry.size() } else { 0 };
                let perm = if kind == EntryKind::Directory { 0o755 } else { 0o644 };
                let result = f(SourceEntry {
                    kind,
                    path: entry.name().trim_end_matches('/').to_string(),
                    link_target: String::new(),
                    size,
                    atime: 0,
                    mtime: 0,
                    mode: full_mode(kind, perm),
                    uid: 0,
                    gid: 0,
                    content: kind.has_content().then_some(reader as &mut dyn Read),
                });
                match result {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        failure = Some(e);
                        Ok(false)
                    }
                }
            })
            .map_err(|e| foreign_err("7z", e))?;
            match failure {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }
}

#[cfg(feature = "rar")]
mod rar {
    use super::*;

    fn rar_err(e: impl std::fmt::Display) -> ArchiveError {
        foreign_err(
            "rar",
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        )
    }

    /// Adapter over rar archives. The unrar reader yields whole entries, so
    /// file content is buffered per entry before being handed to the sink.
    pub struct RarSource {
        path: PathBuf,
    }

    impl RarSource {
        pub fn new(path: &Path) -> Self {
            RarSource {
                path: path.to_path_buf(),
            }
        }
    }

    impl EntrySource for RarSource {
        fn for_each(
            &mut self,
            f: &mut dyn FnMut(SourceEntry<'_>) -> Result<(), ArchiveError>,
        ) -> Result<(), ArchiveError> {
            let mut archive = unrar::Archive::new(&self.path)
                .open_for_processing()
                .map_err(rar_err)?;
            loop {
                let cursor = match archive.read_header().map_err(rar_err)? {
                    Some(c) => c,
                    None => break,
                };
                let filename = cursor.entry().filename.clone();
                let is_dir = cursor.entry().is_directory();
                let path = filename.to_string_lossy().into_owned();
                if is_dir {
                    f(SourceEntry {
                        kind: EntryKind::Directory,
                        path,
                        link_target: String::new(),
                        size: 0,
                        atime: 0,
                        mtime: 0,
                        mode: full_mode(EntryKind::Directory, 0o755),
                        uid: 0,
                        gid: 0,
                        content: None,
                    })?;
                    archive = cursor.skip().map_err(rar_err)?;
                } else {
                    let (data, next) = cursor.read().map_err(rar_err)?;
                    let mut reader: &[u8] = &data;
                    f(SourceEntry {
                        kind: EntryKind::Regular,
                        path,
                        link_target: String::new(),
                        size: data.len() as u64,
                        atime: 0,
                        mtime: 0,
                        mode: full_mode(EntryKind::Regular, 0o644),
                        uid: 0,
                        gid: 0,
                        content: Some(&mut reader as &mut dyn Read),
                    })?;
                    archive = next;
                }
            }
            Ok(())
        }
    }
}
