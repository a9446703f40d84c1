//! # Entry Classification
//!
//! Maps filesystem metadata (mode bits, inode numbers) to the container's
//! entry-type codes and detects hard links by remembering inode-to-path
//! associations observed earlier in the same pack operation. The inode map is
//! transient: it lives for exactly one pack invocation and is never persisted.

use std::collections::HashMap;
use std::io::Read;

use crate::error::ArchiveError;

/// The entry-type codes stored in the container's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Regular,
    HardLink,
    Symlink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
}

impl EntryKind {
    /// Wire code, written as a single lowercase hex digit.
    pub fn code(self) -> u32 {
        match self {
            EntryKind::Regular => 0,
            EntryKind::HardLink => 1,
            EntryKind::Symlink => 2,
            EntryKind::CharDevice => 3,
            EntryKind::BlockDevice => 4,
            EntryKind::Directory => 5,
            EntryKind::Fifo => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<EntryKind> {
        match code {
            0 => Some(EntryKind::Regular),
            1 => Some(EntryKind::HardLink),
            2 => Some(EntryKind::Symlink),
            3 => Some(EntryKind::CharDevice),
            4 => Some(EntryKind::BlockDevice),
            5 => Some(EntryKind::Directory),
            6 => Some(EntryKind::Fifo),
            _ => None,
        }
    }

    /// Classifies raw `st_mode` bits. Unrecognized file types fall back to
    /// `Regular`; this is a deliberate lossy default, not an error.
    pub fn from_mode(mode: u32) -> EntryKind {
        match mode & (libc::S_IFMT as u32) {
            m if m == libc::S_IFREG as u32 => EntryKind::Regular,
            m if m == libc::S_IFLNK as u32 => EntryKind::Symlink,
            m if m == libc::S_IFCHR as u32 => EntryKind::CharDevice,
            m if m == libc::S_IFBLK as u32 => EntryKind::BlockDevice,
            m if m == libc::S_IFDIR as u32 => EntryKind::Directory,
            m if m == libc::S_IFIFO as u32 => EntryKind::Fifo,
            _ => EntryKind::Regular,
        }
    }

    /// Only regular entries carry content bytes in the container.
    pub fn has_content(self) -> bool {
        matches!(self, EntryKind::Regular)
    }

    /// Link kinds populate the `link_target` field.
    pub fn is_link(self) -> bool {
        matches!(self, EntryKind::HardLink | EntryKind::Symlink)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntryKind::Regular => "file",
            EntryKind::HardLink => "hardlink",
            EntryKind::Symlink => "symlink",
            EntryKind::CharDevice => "chardev",
            EntryKind::BlockDevice => "blockdev",
            EntryKind::Directory => "dir",
            EntryKind::Fifo => "fifo",
        };
        f.pad(name)
    }
}

/// Pack-scope inode-to-path map used solely for hard-link detection.
#[derive(Debug, Default)]
pub struct InodeMap {
    seen: HashMap<u64, String>,
}

impl InodeMap {
    pub fn new() -> Self {
        InodeMap::default()
    }

    /// Classifies a path whose mode indicates a regular file. If the inode was
    /// seen before in this pack operation the entry becomes a hard link to the
    /// first-seen path; otherwise the inode is recorded and the entry stays
    /// regular. Non-regular kinds must not consult the map.
    pub fn classify_regular(&mut self, inode: u64, path: &str) -> (EntryKind, String) {
        match self.seen.get(&inode) {
            Some(first) => (EntryKind::HardLink, first.clone()),
            None => {
                self.seen.insert(inode, path.to_string());
                (EntryKind::Regular, String::new())
            }
        }
    }
}

/// One entry produced by an entry source: local filesystem walk or a
/// foreign-format adapter. `content` is a lazy, non-restartable reader
/// present only for regular entries.
pub struct SourceEntry<'a> {
    pub kind: EntryKind,
    pub path: String,
    pub link_target: String,
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub content: Option<&'a mut dyn Read>,
}

/// The minimal capability the pack engine consumes: a finite, in-order
/// sequence of entries visited exactly once. Implemented by the local
/// filesystem walk and by every foreign-format adapter.
pub trait EntrySource {
    fn for_each(
        &mut self,
        f: &mut dyn FnMut(SourceEntry<'_>) -> Result<(), ArchiveError>,
    ) -> Result<(), ArchiveError>;
}
