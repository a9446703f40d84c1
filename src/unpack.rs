//! # Unpack Engine
//!
//! Streams records back into a directory tree in container order. Hard links
//! may only reference targets materialized earlier in the same stream, so
//! entries are never reordered; a forward hard-link reference is a fatal
//! ordering/corruption error. Checksum mismatches are surfaced as warnings
//! and do not stop the reconstruction of later records; full-container
//! integrity is the validate engine's job.

use std::collections::HashSet;
use std::ffi::CString;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

use crate::checksum::{self, ChecksumAlgo, NONE_SENTINEL};
use crate::entry::EntryKind;
use crate::envelope::{self, Codec};
use crate::error::{ArchiveError, ChecksumPart};
use crate::format::FormatDescriptor;
use crate::record::{ContainerReader, Record};

#[derive(Debug, Clone)]
pub struct UnpackOptions {
    /// Pin the envelope codec instead of auto-detecting it. Required for
    /// brotli containers, which carry no magic bytes.
    pub codec: Option<Codec>,
    /// Reapply mode, ownership and timestamps after content is written.
    pub preserve: bool,
    pub descriptor: FormatDescriptor,
    pub verbose: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        UnpackOptions {
            codec: None,
            preserve: false,
            descriptor: FormatDescriptor::default(),
            verbose: false,
        }
    }
}

/// One non-fatal digest mismatch observed while unpacking.
#[derive(Debug, Clone)]
pub struct ChecksumWarning {
    pub index: u64,
    pub path: String,
    pub part: ChecksumPart,
}

/// The outcome of an unpack: entry count plus surfaced checksum warnings.
#[derive(Debug, Default)]
pub struct UnpackReport {
    pub entries: u64,
    pub warnings: Vec<ChecksumWarning>,
}

/// Reconstructs the filesystem tree stored in `input` under `output_dir`.
pub fn unpack(
    input: &Path,
    output_dir: &Path,
    opts: &UnpackOptions,
) -> Result<UnpackReport, ArchiveError> {
    let file = File::open(input).map_err(|e| ArchiveError::io(e, input))?;
    let reader = envelope::open_reader(file, opts.codec)?;
    let mut container = ContainerReader::new(BufReader::new(reader), &opts.descriptor)?;

    fs::create_dir_all(output_dir).map_err(|e| ArchiveError::io(e, output_dir))?;

    let mut report = UnpackReport::default();
    // Paths materialized so far, consulted by hard-link records.
    let mut created: HashSet<String> = HashSet::new();
    // Directory modes are applied after the walk so a read-only directory
    // cannot block creation of its own children.
    let mut deferred_dirs: Vec<(PathBuf, Record)> = Vec::new();

    while let Some(rec) = container.next_record()? {
        verify_header(&rec, &mut report);

        let rel = sanitize_path(&rec.header.path, rec.index)?;
        let target = output_dir.join(&rel);
        if opts.verbose {
            println!("{} {}", rec.header.kind, rec.header.path);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(e, parent))?;
        }

        match rec.header.kind {
            EntryKind::Directory => {
                fs::create_dir_all(&target).map_err(|e| ArchiveError::io(e, target.as_path()))?;
                if opts.preserve {
                    deferred_dirs.push((target.clone(), rec.clone()));
                }
            }
            EntryKind::Regular => {
                let algo = content_algo(&rec);
                // A pre-existing symlink here would redirect the write
                // outside the output directory; unlink it first.
                if let Ok(meta) = fs::symlink_metadata(&target) {
                    if meta.file_type().is_symlink() {
                        fs::remove_file(&target)
                            .map_err(|e| ArchiveError::io(e, target.as_path()))?;
                    }
                }
                let mut out =
                    File::create(&target).map_err(|e| ArchiveError::io(e, target.as_path()))?;
                let (digest, _) = container.read_content(algo, &mut out)?;
                drop(out);
                if algo != ChecksumAlgo::None && digest != rec.content_checksum {
                    tracing::warn!(
                        path = %rec.header.path,
                        expected = %rec.content_checksum,
                        actual = %digest,
                        "content checksum mismatch"
                    );
                    report.warnings.push(ChecksumWarning {
                        index: rec.index,
                        path: rec.header.path.clone(),
                        part: ChecksumPart::Content,
                    });
                }
                if opts.preserve {
                    apply_attributes(&target, &rec, false)?;
                }
            }
            EntryKind::Symlink => {
                // Overwrite a stale link from a previous unpack.
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target).map_err(|e| ArchiveError::io(e, target.as_path()))?;
                }
                std::os::unix::fs::symlink(&rec.header.link_target, target.as_path())
                    .map_err(|e| ArchiveError::io(e, target.as_path()))?;
                if opts.preserve {
                    apply_attributes(&target, &rec, true)?;
                }
            }
            EntryKind::HardLink => {
                if !created.contains(&rec.header.link_target) {
                    return Err(ArchiveError::HardLinkOrdering {
                        path: rec.header.path.clone(),
                        target: rec.header.link_target.clone(),
                    });
                }
                let link_source = output_dir.join(sanitize_path(&rec.header.link_target, rec.index)?);
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target).map_err(|e| ArchiveError::io(e, target.as_path()))?;
                }
                fs::hard_link(&link_source, target.as_path())
                    .map_err(|e| ArchiveError::io(e, target.as_path()))?;
                // Attributes are shared with the link source; nothing to reapply.
            }
            EntryKind::Fifo => {
                let cpath = cstring_path(&target)?;
                let mode = (rec.header.mode & 0o7777) as libc::mode_t;
                let rc = unsafe { libc::mkfifo(cpath.as_ptr(), mode) };
                if rc != 0 {
                    return Err(ArchiveError::io(io::Error::last_os_error(), target.as_path()));
                }
                if opts.preserve {
                    apply_attributes(&target, &rec, false)?;
                }
            }
            EntryKind::CharDevice | EntryKind::BlockDevice => {
                // The wire format carries no device numbers; nodes are
                // recreated with a null rdev. Requires privileges.
                let ifmt = if rec.header.kind == EntryKind::CharDevice {
                    libc::S_IFCHR
                } else {
                    libc::S_IFBLK
                };
                let cpath = cstring_path(&target)?;
                let mode = ((rec.header.mode & 0o7777) as libc::mode_t) | ifmt;
                let rc = unsafe { libc::mknod(cpath.as_ptr(), mode, 0) };
                if rc != 0 {
                    return Err(ArchiveError::io(io::Error::last_os_error(), target.as_path()));
                }
                if opts.preserve {
                    apply_attributes(&target, &rec, false)?;
                }
            }
        }

        created.insert(rec.header.path.clone());
        report.entries += 1;
    }

    // Deepest directories first, so parent mode changes come last.
    deferred_dirs.sort_by_key(|(p, _)| std::cmp::Reverse(p.components().count()));
    for (path, rec) in deferred_dirs {
        apply_attributes(&path, &rec, false)?;
    }

    Ok(report)
}

fn content_algo(rec: &Record) -> ChecksumAlgo {
    if rec.content_checksum == NONE_SENTINEL {
        return ChecksumAlgo::None;
    }
    ChecksumAlgo::infer(&rec.content_checksum).unwrap_or(ChecksumAlgo::None)
}

fn verify_header(rec: &Record, report: &mut UnpackReport) {
    let algo = match ChecksumAlgo::infer(&rec.header_checksum) {
        Some(a) if a != ChecksumAlgo::None => a,
        _ => return,
    };
    let actual = checksum::digest_bytes(algo, &rec.header_bytes);
    if actual != rec.header_checksum {
        tracing::warn!(path = %rec.header.path, "header checksum mismatch");
        report.warnings.push(ChecksumWarning {
            index: rec.index,
            path: rec.header.path.clone(),
            part: ChecksumPart::Header,
        });
    }
}

/// Rejects absolute paths and parent-directory escapes in stored entry paths.
fn sanitize_path(stored: &str, index: u64) -> Result<PathBuf, ArchiveError> {
    let mut out = PathBuf::new();
    for comp in Path::new(stored).components() {
        match comp {
            Component::Normal(c) => out.push(c),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::format(
                    index,
                    format!("absolute entry path '{stored}' is not allowed"),
                ));
            }
            Component::ParentDir => {
                return Err(ArchiveError::format(
                    index,
                    format!("entry path '{stored}' escapes the output directory"),
                ));
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(ArchiveError::format(index, "empty entry path"));
    }
    Ok(out)
}

fn cstring_path(path: &Path) -> Result<CString, ArchiveError> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| ArchiveError::format(0, "path contains an interior NUL byte"))
}

/// Reapplies preserved attributes: ownership (best effort without
/// privileges), mode bits, then timestamps. Always called after content is
/// written so a read-only mode cannot block the write itself.
fn apply_attributes(path: &Path, rec: &Record, symlink: bool) -> Result<(), ArchiveError> {
    let cpath = cstring_path(path)?;

    // Ownership restoration fails for ordinary users; that is expected and
    // only logged.
    let rc = unsafe { libc::lchown(cpath.as_ptr(), rec.header.uid, rec.header.gid) };
    if rc != 0 {
        tracing::debug!(path = %path.display(), "lchown failed, continuing");
    }

    if !symlink {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(rec.header.mode & 0o7777))
            .map_err(|e| ArchiveError::io(e, path))?;
    }

    let times = [
        libc::timespec {
            tv_sec: rec.header.atime as libc::time_t,
            tv_nsec: 0,
        },
        libc::timespec {
            tv_sec: rec.header.mtime as libc::time_t,
            tv_nsec: 0,
        },
    ];
    let rc = unsafe {
        libc::utimensat(
            libc::AT_FDCWD,
            cpath.as_ptr(),
            times.as_ptr(),
            libc::AT_SYMLINK_NOFOLLOW,
        )
    };
    if rc != 0 {
        return Err(ArchiveError::io(io::Error::last_os_error(), path));
    }
    Ok(())
}
